fn main() {
    if let Err(err) = cohort_editor::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
