use anyhow::{Context, Result};
use clap::{self, Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_forest::ForestLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

mod editor;

use editor::backend::GeneratedPolicy;
use editor::config_files::EditorConfig;
use editor::script::ScriptRunner;
use editor::session::Session;
use editor::store::FileBackend;

/// Log targets of the editing core
const DEBUG_TARGETS: [&str; 8] = [
    "catalog", "form", "merger", "policy", "render", "script", "session", "store",
];

/// Which rendering of the policies to print
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Variant {
    /// One policy holding everything
    All,
    /// One policy per service
    PerService,
    /// One policy per source interface, destination interface and service
    PerInterface,
}

impl Variant {
    fn pick(self, policy: &GeneratedPolicy) -> &str {
        match self {
            Variant::All => &policy.output1,
            Variant::PerService => &policy.output2,
            Variant::PerInterface => &policy.output3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "fortigate-policy-editor", version, about, long_about)]
struct Args {
    /// Workspace holding editor.conf and the templates
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    workspace: PathBuf,

    /// Template to start from; the device catalog and a blank policy otherwise
    #[arg(short, long, value_name = "NAME")]
    template: Option<String>,

    /// Edit script to run
    #[arg(short, long, value_name = "FILE")]
    script: Option<PathBuf>,

    /// Print the generated policy text
    #[arg(short, long, value_name = "VARIANT")]
    generate: Option<Variant>,

    /// Save the policies as a template
    #[arg(long, value_name = "NAME")]
    save: Option<String>,

    /// Debug
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    debug: bool,
}

async fn start(args: Args) -> Result<()> {
    let conf = EditorConfig::load(&args.workspace).map_err(|e| {
        let msg = format!("load configuration: {:?}", &e.root_cause());
        e.context(msg)
    })?;

    let backend = FileBackend::open(&args.workspace, &conf).await?;
    let mut session = Session::new(conf.load_ordering);

    match &args.template {
        Some(name) => session.load_template(&backend, name).await?,
        None => session.load_blank(&backend).await?,
    }

    info!(
        "session ready with {} policies and {} catalog entries",
        session.len(),
        session.catalog().len()
    );

    if let Some(script) = &args.script {
        info!("running {}", script.display());

        let text = tokio::fs::read_to_string(script)
            .await
            .with_context(|| format!("read {}", script.display()))?;

        ScriptRunner::new(&backend, &args.workspace)
            .run(&mut session, &text)
            .await
            .with_context(|| format!("script {}", script.display()))?;
    }

    if let Some(name) = &args.save {
        session.save_template(&backend, name).await?;
        info!("saved template {}", name);
    }

    if let Some(variant) = args.generate {
        for policy in session.generate(&backend).await? {
            println!("# {}", policy.policy_name);
            println!("{}", variant.pick(&policy));
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "fortigate_policy_editor=debug,{}",
                DEBUG_TARGETS.map(|t| format!("{}=debug", t)).join(",")
            ))
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(ForestLayer::default())
            .init();
    } else {
        let f = fmt::layer().with_level(true).with_target(true);

        tracing_subscriber::registry()
            .with(EnvFilter::new("info"))
            .with(f)
            .init();
    }

    match start(args).await {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("{:#}", &e);
            Ok(())
        }
    }
}
