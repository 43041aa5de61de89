use std::path::Path;

fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("manifest dir");
    let version_path = Path::new(&manifest_dir).join("../../VERSION");
    println!("cargo:rerun-if-changed={}", version_path.display());

    let contents = std::fs::read_to_string(&version_path).expect("read workspace VERSION file");
    let version = contents.trim();
    assert!(
        !version.is_empty() && !version.contains(char::is_whitespace),
        "VERSION must hold one non-empty version token"
    );

    println!("cargo:rustc-env=STARING_CONTEST_VERSION={version}");
}
