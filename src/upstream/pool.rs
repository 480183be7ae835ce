//! Bounded per-host connection pool.
//!
//! Keeps idle upstream HTTP/1.1 handles per host up to the domain's
//! `max_connections`. `get` hands back an idle live handle or dials a
//! new one below the cap and errors once the cap is reached; `put`
//! returns a handle to the pool or discards it when closed or when the
//! pool is full. The mutex is never held across an await point.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{connect, UpstreamConn};
use crate::config::DomainConfig;
use crate::error::{Error, Result};

struct HostSlot {
    idle: Vec<UpstreamConn>,
    /// Connections currently alive for this host, idle or in flight.
    live: usize,
    max: usize,
}

impl HostSlot {
    fn new(max: usize) -> Self {
        Self {
            idle: Vec::new(),
            live: 0,
            max,
        }
    }
}

/// Per-host bookkeeping of pooled upstream connections.
#[derive(Default)]
pub struct ConnectionPool {
    hosts: Mutex<HashMap<String, HostSlot>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand back an idle connection or dial a new one below the cap.
    pub async fn get(
        &self,
        authority: &str,
        cfg: &DomainConfig,
        tls: bool,
    ) -> Result<UpstreamConn> {
        {
            let mut hosts = self.hosts.lock().unwrap();
            let slot = hosts
                .entry(authority.to_string())
                .or_insert_with(|| HostSlot::new(cfg.max_connections));

            while let Some(conn) = slot.idle.pop() {
                if conn.is_closed() {
                    slot.live = slot.live.saturating_sub(1);
                    continue;
                }
                return Ok(conn);
            }

            if slot.live >= slot.max {
                return Err(Error::pool(format!(
                    "{}: maximum connections reached",
                    authority
                )));
            }
            slot.live += 1;
        }

        match connect(authority, cfg, tls).await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                let mut hosts = self.hosts.lock().unwrap();
                if let Some(slot) = hosts.get_mut(authority) {
                    slot.live = slot.live.saturating_sub(1);
                }
                Err(e)
            }
        }
    }

    /// Return a connection to the pool, closing it instead when it is
    /// unusable or the pool is full.
    pub fn put(&self, authority: &str, conn: UpstreamConn) {
        let mut hosts = self.hosts.lock().unwrap();
        let Some(slot) = hosts.get_mut(authority) else {
            return;
        };

        if conn.is_closed() || slot.idle.len() >= slot.max {
            slot.live = slot.live.saturating_sub(1);
            return;
        }

        slot.idle.push(conn);
    }

    /// Live connection count for a host (idle + in flight).
    pub fn live(&self, authority: &str) -> usize {
        let hosts = self.hosts.lock().unwrap();
        hosts.get(authority).map(|slot| slot.live).unwrap_or(0)
    }
}
