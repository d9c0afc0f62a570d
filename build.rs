fn main() {
    uniffi::generate_scaffolding("src/hydrosense.udl").unwrap();
}
