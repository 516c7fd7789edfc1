use anyhow::Result;
use slashpass::context_builder::ContextBuilder;
use tracing::info;

fn main() -> Result<()> {
    let context_builder = ContextBuilder::from_cli()?;
    let context = context_builder.try_build_and_start()?;

    context.log_configuration();

    info!("slashpass relay is ready");
    context.wait_for_termination()?;
    info!("shutting down slashpass relay");

    context.shutdown()
}
