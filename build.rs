fn main() -> Result<(), Box<dyn std::error::Error>> {
    const PROTO: &str = "proto/gtfs-realtime.proto";
    println!("cargo:rerun-if-changed={PROTO}");

    prost_build::Config::new()
        .protoc_executable(protoc_bin_vendored::protoc_bin_path()?)
        .compile_protos(&[PROTO], &["proto/"])?;

    Ok(())
}
