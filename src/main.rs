use std::process;

use anyhow::Context;
use vision_caption::config::{init_tracing, Cli, TRACING_TARGET};
use vision_caption::{create_captioner, CaptionPipeline};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let Err(error) = run().await else {
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET,
            error = %format!("{error:#}"),
            "aborting"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    init_tracing();
    cli.log();

    let backend = cli.backend();
    let captioner = create_captioner(&backend, reqwest::Client::new())
        .context("failed to configure captioning backend")?;

    tracing::info!(
        target: TRACING_TARGET,
        backend = captioner.backend_name(),
        endpoint = captioner.endpoint(),
        model = %cli.model,
        "using captioning backend"
    );
    tracing::info!(
        target: TRACING_TARGET,
        path = %cli.path.display(),
        "scanning"
    );

    let pipeline = CaptionPipeline::new(captioner, cli.caption_settings());
    let mut stdout = std::io::stdout();
    pipeline
        .run(&cli.path, &mut stdout)
        .await
        .with_context(|| format!("captioning {} failed", cli.path.display()))?;

    Ok(())
}
