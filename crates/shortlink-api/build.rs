//! Build script for generating Rust code from protobuf definitions.

use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/");

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    tonic_build::configure()
        .build_server(true)
        // Clients are only used by tests.
        .build_client(true)
        .build_transport(false)
        // Needed by the reflection service.
        .file_descriptor_set_path(out_dir.join("shortlink_descriptor.bin"))
        .compile(&["proto/shortlink/v1/shortlink.proto"], &["proto/"])?;

    Ok(())
}
