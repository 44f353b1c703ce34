fn main() {
    if !cfg!(target_os = "linux") {
        panic!(
            "{} only works on linux (gdb with pseudo-terminal support is required)",
            env!("CARGO_PKG_NAME")
        );
    }
}
