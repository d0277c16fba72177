// Numan Thabit 2025
use tonic_build::manual::{Builder, Method, Service};

fn main() {
    let codec = "tonic::codec::ProstCodec";
    let demo = Service::builder()
        .name("DemoService")
        .package("proto")
        .method(
            Method::builder()
                .name("say_hello")
                .route_name("SayHello")
                .input_type("crate::pb::HelloRequest")
                .output_type("crate::pb::HelloResponse")
                .codec_path(codec)
                .build(),
        )
        .method(
            Method::builder()
                .name("stream_hello")
                .route_name("StreamHello")
                .input_type("crate::pb::HelloStreamRequest")
                .output_type("crate::pb::HelloResponse")
                .codec_path(codec)
                .server_streaming()
                .build(),
        )
        .build();

    Builder::new().compile(&[demo]);
}
