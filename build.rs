//! Build script for proto compilation.
//!
//! Compiles `proto/provider.proto` into the gRPC server stubs that
//! `src/server.rs` includes via `tonic::include_proto!`. Only the server
//! side is generated; the host owns the client.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/provider.proto");
    println!("cargo:rerun-if-changed=proto");

    tonic_prost_build::configure()
        .build_client(false)
        .build_server(true)
        .compile_protos(&["proto/provider.proto"], &["proto"])?;

    Ok(())
}
