use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=KYFGLIB_DIR");

    // Without the `sdk` feature the crate only talks to the mock native layer,
    // so there is nothing to link.
    if env::var_os("CARGO_FEATURE_SDK").is_none() {
        return;
    }

    if let Some(libdir) = env::var_os("KYFGLIB_DIR") {
        println!("cargo:rustc-link-search=native={}", libdir.to_string_lossy());
    }

    println!("cargo:rustc-link-lib=dylib=KYFGLib");
}
