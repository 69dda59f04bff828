//! Generates Kotlin and Swift bindings for `certinstaller-core`.

fn main() {
    uniffi::uniffi_bindgen_main();
}
