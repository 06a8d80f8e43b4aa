use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rustc-check-cfg=cfg(rustc_is_nightly)");
    println!("cargo:rerun-if-env-changed=RUSTC");

    // The AVX-512 `feature(...)` gates in lib.rs are only switched on for nightly toolchains.
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let version = Command::new(&rustc)
        .arg("--version")
        .output()
        .ok()
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .unwrap_or_default();

    if version.contains("nightly") || version.contains("-dev") {
        println!("cargo:rustc-cfg=rustc_is_nightly");
    } else if env::var("CARGO_FEATURE_NIGHTLY_AVX").is_ok() {
        println!("cargo:warning=feature `nightly-avx` on a non-nightly rustc ({}); AVX-512 kernels need rustc >= 1.89", version.trim());
    }
}
