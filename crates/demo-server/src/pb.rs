// Numan Thabit 2025
//! Wire messages and generated stubs for `proto.DemoService`.

/// Unary greeting request.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloRequest {
    /// Name to greet. Any value, including empty, is accepted.
    #[prost(string, tag = "1")]
    pub name: String,
}

/// Greeting returned by both methods.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloResponse {
    /// `"Hello " + name`.
    #[prost(string, tag = "1")]
    pub message: String,
}

/// Server-streaming greeting request.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloStreamRequest {
    /// Name to greet.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Number of greetings to stream back.
    #[prost(uint32, tag = "2")]
    pub count: u32,
}

include!(concat!(env!("OUT_DIR"), "/proto.DemoService.rs"));
