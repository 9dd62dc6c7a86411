fn main() {
    // option_env!() values are baked in at compile time; rebuild when they change.
    println!("cargo:rerun-if-env-changed=ROBOHIRE_API_URL");
    println!("cargo:rerun-if-env-changed=ROBOHIRE_IDENTITY_URL");
}
