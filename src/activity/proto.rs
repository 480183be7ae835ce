//! Wire types and client for the `activity.Activity` gRPC service.
//!
//! Maintained by hand in the shape `tonic-build` emits so the crate
//! carries no protoc build step. Field tags are part of the wire
//! contract with the activity service; do not renumber them.

/// Empty request/reply payload.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Empty {}

/// An outstanding (or replayed) request record.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReqRequest {
    #[prost(int32, tag = "1")]
    pub req_id: i32,
    #[prost(string, tag = "2")]
    pub url: ::prost::alloc::string::String,
    /// JSON-encoded header list
    #[prost(bytes = "vec", tag = "3")]
    pub header: ::prost::alloc::vec::Vec<u8>,
    #[prost(bool, tag = "4")]
    pub completed: bool,
}

/// Reply to `StoreRequest`, carrying the assigned request id.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct StoreReply {
    #[prost(int32, tag = "1")]
    pub req_id: i32,
}

/// Reply to `GetRequests`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReqsReply {
    #[prost(message, repeated, tag = "1")]
    pub requests: ::prost::alloc::vec::Vec<ReqRequest>,
}

/// A persisted response envelope.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResRequest {
    #[prost(string, tag = "1")]
    pub host: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub url: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "3")]
    pub body: ::prost::alloc::vec::Vec<u8>,
    /// JSON-encoded response metadata
    #[prost(bytes = "vec", tag = "4")]
    pub response: ::prost::alloc::vec::Vec<u8>,
    #[prost(message, optional, tag = "5")]
    pub expires: ::core::option::Option<::prost_types::Timestamp>,
}

/// Key for `GetResponse`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetResRequest {
    #[prost(string, tag = "1")]
    pub host: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub url: ::prost::alloc::string::String,
}

/// Key for `GetHostSize`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HostSizeRequest {
    #[prost(string, tag = "1")]
    pub host: ::prost::alloc::string::String,
}

/// Reply to `GetHostSize`.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct HostSizeReply {
    #[prost(int64, tag = "1")]
    pub size: i64,
}

/// Generated client implementations.
pub mod activity_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct ActivityClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl ActivityClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }

    impl<T> ActivityClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        pub async fn store_request(
            &mut self,
            request: impl tonic::IntoRequest<super::ReqRequest>,
        ) -> std::result::Result<tonic::Response<super::StoreReply>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/activity.Activity/StoreRequest");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("activity.Activity", "StoreRequest"));
            self.inner.unary(req, path, codec).await
        }

        pub async fn update_request(
            &mut self,
            request: impl tonic::IntoRequest<super::ReqRequest>,
        ) -> std::result::Result<tonic::Response<super::Empty>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/activity.Activity/UpdateRequest");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("activity.Activity", "UpdateRequest"));
            self.inner.unary(req, path, codec).await
        }

        pub async fn get_requests(
            &mut self,
            request: impl tonic::IntoRequest<super::Empty>,
        ) -> std::result::Result<tonic::Response<super::ReqsReply>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/activity.Activity/GetRequests");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("activity.Activity", "GetRequests"));
            self.inner.unary(req, path, codec).await
        }

        pub async fn store_response(
            &mut self,
            request: impl tonic::IntoRequest<super::ResRequest>,
        ) -> std::result::Result<tonic::Response<super::Empty>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/activity.Activity/StoreResponse");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("activity.Activity", "StoreResponse"));
            self.inner.unary(req, path, codec).await
        }

        pub async fn get_response(
            &mut self,
            request: impl tonic::IntoRequest<super::GetResRequest>,
        ) -> std::result::Result<tonic::Response<super::ResRequest>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/activity.Activity/GetResponse");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("activity.Activity", "GetResponse"));
            self.inner.unary(req, path, codec).await
        }

        pub async fn get_host_size(
            &mut self,
            request: impl tonic::IntoRequest<super::HostSizeRequest>,
        ) -> std::result::Result<tonic::Response<super::HostSizeReply>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/activity.Activity/GetHostSize");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("activity.Activity", "GetHostSize"));
            self.inner.unary(req, path, codec).await
        }
    }
}
