fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=../target/vcpkg/installed/vcpkg/status");

    // Only the OCR backend links native libraries.
    if std::env::var_os("CARGO_FEATURE_TESSERACT").is_none() {
        return;
    }

    let tesseract_found = vcpkg::find_package("tesseract");
    let leptonica_found = vcpkg::find_package("leptonica");

    if tesseract_found.is_err() {
        println!("cargo:warning=Missing vcpkg dependency: tesseract");
    }

    if leptonica_found.is_err() {
        println!("cargo:warning=Missing vcpkg dependency: leptonica");
    }

    let missing = tesseract_found.is_err() || leptonica_found.is_err();
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if missing && target_os == "windows" {
        eprintln!("Please install the missing dependencies with cargo-vcpkg");
        eprintln!("Run the following commands:");
        eprintln!();
        eprintln!("cargo install cargo-vcpkg");
        eprintln!("cargo vcpkg build");
        eprintln!();
        eprintln!("Then try cargo build again.");
        panic!("Missing vcpkg dependencies");
    }
}
