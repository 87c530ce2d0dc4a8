use clap::{Parser, Subcommand};
use registry_admin::{
    delete_range, delete_repository, delete_tags, group_sizes, group_tags_by_digest,
    readable_size, repository_sizes, AdminConfig, HttpRegistryClient, RegistryApi, Result,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docker-registry", version)]
#[command(about = "List and delete repositories and tags on a Docker registry", long_about = None)]
struct Cli {
    /// Base URL of the registry
    #[arg(long, env = "DOCKER_REGISTRY_URL")]
    registry_url: String,

    /// Registry storage root, i.e. `var/lib/registry/docker/registry/v2`
    #[arg(long, env = "DOCKER_REGISTRY_DATA_PATH")]
    data_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List repositories, or the tags of one repository grouped by image
    List {
        /// Show sizes
        #[arg(short, long)]
        size: bool,

        repository: Option<String>,
    },

    /// Delete tags (and every tag sharing their image)
    Delete {
        repository: String,

        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Delete every tag group from the one holding `from` to the one holding `to`
    DeleteRange {
        repository: String,
        from_tag: String,
        to_tag: String,
    },

    /// Delete the on-disk data of a repository that has no tags left
    DeleteRepository { repository: String },
}

async fn list_repositories(api: &dyn RegistryApi, size: bool) -> Result<()> {
    if size {
        for (repository, bytes) in repository_sizes(api).await? {
            println!("{} {}", repository, readable_size(bytes));
        }
    } else {
        for repository in api.list_repositories().await? {
            println!("{}", repository);
        }
    }
    Ok(())
}

async fn list_tags(api: &dyn RegistryApi, repository: &str, size: bool) -> Result<()> {
    let groups = group_tags_by_digest(api, repository).await?;
    if size {
        let sizes = group_sizes(api, repository, &groups).await?;
        for (group, bytes) in groups.iter().zip(sizes) {
            println!("{} {}", group.tags.join(" "), readable_size(bytes));
        }
    } else {
        for group in &groups {
            println!("{}", group.tags.join(" "));
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = AdminConfig::new(cli.registry_url).with_optional_data_path(cli.data_path);
    let client = HttpRegistryClient::new(&config);

    match cli.command {
        Commands::List { size, repository } => match repository {
            Some(repository) => list_tags(&client, &repository, size).await?,
            None => list_repositories(&client, size).await?,
        },
        Commands::Delete { repository, tags } => {
            delete_tags(&client, &repository, tags.as_slice()).await?;
        }
        Commands::DeleteRange {
            repository,
            from_tag,
            to_tag,
        } => {
            let outcomes = delete_range(&client, &repository, &from_tag, &to_tag).await?;
            let mut failed = false;
            for outcome in outcomes {
                let tags = outcome.group.tags.join(" ");
                match outcome.result {
                    Ok(()) => println!("Deleted {} {}", repository, tags),
                    Err(e) => {
                        eprintln!("Error deleting {} {}: {}", repository, tags, e);
                        failed = true;
                    }
                }
            }
            if failed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::DeleteRepository { repository } => {
            delete_repository(&client, &config, &repository).await?;
            println!("Deleted {}", repository);
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
