use teamflow::cli;

fn main() {
    std::process::exit(cli::run());
}
