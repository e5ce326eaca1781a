/// Builds the gRPC client and server code for `greeter.proto` using
/// `tonic-prost-build`.
///
/// Both services (`UserService` and `GreeterService`) live in the same proto
/// package, so a single compilation step emits one `greeter` module into the
/// crate's `OUT_DIR`.
///
/// # Descriptor Set
///
/// An encoded `FileDescriptorSet` is written next to the generated code as
/// `greeter_descriptor.bin`. The server feeds it to `tonic-reflection` so that
/// tools like `grpcurl` can discover the schema at runtime.
///
/// # Well-known Types
///
/// `google.protobuf.Empty` is mapped to `()` by prost, so `DeleteUser` returns
/// `tonic::Response<()>` and no extra well-known-types crate is needed.
///
/// # Panics
///
/// This function will `panic!` if code generation fails (for example when
/// `protoc` is not installed).
///
/// # Output
///
/// Generated code is included via:
///
/// ```rust
/// pub mod proto {
///     tonic::include_proto!("greeter");
/// }
/// ```
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("greeter_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/greeter.proto"], &["proto"])
        .unwrap();
}
