use crate::fixtures;
use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor, MethodDescriptor, Value};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::codegen::{Service, StdError};
use tonic::server::{NamedService, UnaryService};
use tonic::{Request, Response, Status};

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;

/// How the server answers every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// `Ping` echoes the text back, `Check` reports the request text as a nested status,
    /// `Open` returns the ticket unchanged.
    Echo,
    /// Never answers.
    Hang,
}

/// A dynamic gRPC server for the `router` fixtures.
///
/// It implements the same `tower::Service` contract as generated servers, so it can be mounted
/// on `tonic::transport::Server` or handed to a client directly as an in-process transport.
#[derive(Debug, Clone)]
pub struct EchoServer {
    pool: DescriptorPool,
    behavior: Behavior,
    handle: Arc<()>,
}

impl EchoServer {
    pub fn new(behavior: Behavior) -> Self {
        let pool = fixtures::descriptor_pool().expect("router fixtures are valid descriptors");
        Self {
            pool,
            behavior,
            handle: Arc::new(()),
        }
    }

    /// Number of live copies of this server, the original included.
    ///
    /// Clients own a copy for as long as their connection is open, so this drops back to one
    /// once every connection has been torn down.
    pub fn live_handles(&self) -> usize {
        Arc::strong_count(&self.handle)
    }

    fn route(&self, path: &str) -> Option<MethodDescriptor> {
        let (service, method) = path.trim_start_matches('/').split_once('/')?;
        self.pool
            .get_service_by_name(service)?
            .methods()
            .find(|m| m.name() == method)
    }
}

impl NamedService for EchoServer {
    const NAME: &'static str = fixtures::ECHO_SERVICE;
}

impl<B> Service<http::Request<B>> for EchoServer
where
    B: http_body::Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let Some(method) = self.route(req.uri().path()) else {
            let status = Status::unimplemented(format!("unknown method {}", req.uri().path()));
            return Box::pin(async move { Ok(status.into_http()) });
        };

        let handler = Handler {
            method: method.clone(),
            behavior: self.behavior,
        };
        Box::pin(async move {
            let codec = ServerCodec {
                input: method.input(),
            };
            let mut grpc = tonic::server::Grpc::new(codec);
            Ok(grpc.unary(handler, req).await)
        })
    }
}

struct Handler {
    method: MethodDescriptor,
    behavior: Behavior,
}

impl UnaryService<DynamicMessage> for Handler {
    type Response = DynamicMessage;
    type Future = BoxFuture<Response<DynamicMessage>, Status>;

    fn call(&mut self, request: Request<DynamicMessage>) -> Self::Future {
        let method = self.method.clone();
        let behavior = self.behavior;

        Box::pin(async move {
            if behavior == Behavior::Hang {
                std::future::pending::<()>().await;
            }

            let request = request.into_inner();
            let response = match method.name() {
                "Ping" => ping(&method.output(), &request),
                "Check" => check(&method.output(), &request),
                _ => request,
            };
            Ok(Response::new(response))
        })
    }
}

fn text_of(request: &DynamicMessage) -> Value {
    request
        .get_field_by_name("text")
        .map(|v| v.into_owned())
        .unwrap_or_else(|| Value::String(String::new()))
}

fn ping(output: &MessageDescriptor, request: &DynamicMessage) -> DynamicMessage {
    let mut response = DynamicMessage::new(output.clone());
    response.set_field_by_name("text", text_of(request));
    response
}

/// Buries the request text three levels deep, in `detail.next.next.status`.
fn check(output: &MessageDescriptor, request: &DynamicMessage) -> DynamicMessage {
    let pool = output.parent_pool();
    let build = |name: &str, fields: Vec<(&str, Value)>| {
        let desc = pool
            .get_message_by_name(name)
            .expect("router fixtures declare every message");
        let mut msg = DynamicMessage::new(desc);
        for (field, value) in fields {
            msg.set_field_by_name(field, value);
        }
        msg
    };

    let level3 = build("router.Level3", vec![("status", text_of(request))]);
    let level2 = build("router.Level2", vec![("next", Value::Message(level3))]);
    let level1 = build(
        "router.Level1",
        vec![
            ("info", Value::String("checked".to_string())),
            ("next", Value::Message(level2)),
        ],
    );
    let leaf = build("router.Node", vec![("name", Value::String("leaf".to_string()))]);
    let root = build(
        "router.Node",
        vec![
            ("name", Value::String("root".to_string())),
            ("children", Value::List(vec![Value::Message(leaf)])),
        ],
    );

    let mut response = DynamicMessage::new(output.clone());
    response.set_field_by_name("detail", Value::Message(level1));
    response.set_field_by_name("nodes", Value::List(vec![Value::Message(root)]));
    response
}

struct ServerCodec {
    input: MessageDescriptor,
}

impl Codec for ServerCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;
    type Encoder = ServerEncoder;
    type Decoder = ServerDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        ServerEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        ServerDecoder(self.input.clone())
    }
}

struct ServerEncoder;

impl Encoder for ServerEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode_raw(dst);
        Ok(())
    }
}

struct ServerDecoder(MessageDescriptor);

impl Decoder for ServerDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut msg = DynamicMessage::new(self.0.clone());
        msg.merge(src)
            .map_err(|e| Status::invalid_argument(format!("Failed to decode request: {e}")))?;
        Ok(Some(msg))
    }
}
