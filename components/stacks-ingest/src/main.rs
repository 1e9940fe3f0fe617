fn main() {
    stacks_ingest::cli::main();
}
