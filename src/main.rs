use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Exit quietly when stdout is closed early (piped to head, less, ...)
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let panic_message = format!("{panic_info}");
        if panic_message.contains("Broken pipe") {
            std::process::exit(0);
        }
        default_panic(panic_info);
    }));

    memory_sync::cli::run_cli().await
}
