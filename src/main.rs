fn main() {
    use clap::Parser;
    use std::error::Error;
    let args = clipfetch::cli::Args::parse();
    if let Err(e) = clipfetch::logging::init(args.verbose, args.quiet) {
        eprintln!("Warning: {}", e);
    }
    if let Err(e) = clipfetch::cli::run(&args) {
        eprintln!("error: {}", e);
        if args.verbose {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}
