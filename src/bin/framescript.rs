use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "framescript", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a document's full per-frame dataset as JSON.
    Render(RenderArgs),
    /// List the available library functions and their signatures.
    Functions,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input document JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output rendered-data JSON.
    #[arg(long)]
    out: PathBuf,

    /// Pretty-print the output.
    #[arg(long)]
    pretty: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Functions => cmd_functions(),
    }
}

fn read_document(path: &Path) -> anyhow::Result<framescript::Document> {
    let f = File::open(path).with_context(|| format!("open document '{}'", path.display()))?;
    let r = BufReader::new(f);
    let doc: framescript::Document =
        serde_json::from_reader(r).with_context(|| "parse document JSON")?;
    Ok(doc)
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let doc = read_document(&args.in_path)?;

    let renderer = framescript::Renderer::new();
    let rendered = renderer.render(&doc)?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    let f = File::create(&args.out)
        .with_context(|| format!("create output '{}'", args.out.display()))?;
    let w = BufWriter::new(f);
    if args.pretty {
        serde_json::to_writer_pretty(w, &rendered)?;
    } else {
        serde_json::to_writer(w, &rendered)?;
    }

    eprintln!(
        "wrote {} ({} frames, {} fields)",
        args.out.display(),
        rendered.rendered_frames.len(),
        rendered.rendered_frames_meta.len()
    );
    Ok(())
}

fn cmd_functions() -> anyhow::Result<()> {
    let lib = framescript::FunctionLibrary::standard();
    for name in lib.names() {
        if let Some(spec) = lib.get(name) {
            println!("{}", spec.signature(name));
            println!("    {}", spec.description);
        }
    }
    Ok(())
}
