use std::process::ExitCode;

use autowire_base::CommandRegistry;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    CommandRegistry::with_defaults().run_main().await
}
