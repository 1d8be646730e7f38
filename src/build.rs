/// Migrations are embedded into the binary, so rebuild whenever they change.
fn main() {
    println!("cargo::rerun-if-changed=migrations/");
}
