// Uses protox (pure Rust protobuf compiler) to avoid requiring external protoc binary
fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/process_instance.proto");
    let file_descriptors = protox::compile(["proto/process_instance.proto"], ["proto"])?;
    prost_build::Config::new().compile_fds(file_descriptors)?;
    Ok(())
}
