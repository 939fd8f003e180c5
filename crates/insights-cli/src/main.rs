//! Insights CLI - browse, publish and discuss articles from the terminal.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Insights CLI - read and manage the firm's articles.
#[derive(Parser)]
#[command(name = "insights")]
#[command(about = "Browse, publish and discuss insights articles")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "INSIGHTS_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Config file (defaults to <config dir>/insights/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List articles, newest first
    List {
        /// Case-insensitive search over title, body, author and tags
        #[arg(short, long)]
        search: Option<String>,
        /// Only articles with this exact tag
        #[arg(short, long)]
        tag: Option<String>,
        /// Page number (1-indexed)
        #[arg(short, long, default_value = "1")]
        page: usize,
        /// Include drafts
        #[arg(long)]
        all: bool,
    },

    /// List featured articles
    Featured,

    /// Show one article with its likes and comments
    Show {
        /// Article slug
        slug: String,
    },

    /// Create an article (requires INSIGHTS_EMAIL / INSIGHTS_PASSWORD)
    Create {
        #[arg(long)]
        title: String,
        /// Body text
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,
        /// Read the body from a file
        #[arg(long)]
        content_file: Option<PathBuf>,
        #[arg(long, default_value = "")]
        author: String,
        /// Comma-separated tags
        #[arg(long, default_value = "")]
        tags: String,
        /// Image file to attach (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// PDF file to attach
        #[arg(long)]
        pdf: Option<PathBuf>,
        #[arg(long)]
        published: bool,
        #[arg(long)]
        featured: bool,
    },

    /// Publish an article, or unpublish it with --off
    Publish {
        /// Article ID
        id: String,
        #[arg(long)]
        off: bool,
    },

    /// Feature an article, or unfeature it with --off
    Feature {
        /// Article ID
        id: String,
        #[arg(long)]
        off: bool,
    },

    /// Delete an article
    Delete {
        /// Article ID
        id: String,
    },

    /// Toggle your like on an article
    Like {
        /// Article slug
        slug: String,
    },

    /// Comment on an article
    Comment {
        /// Article slug
        slug: String,
        /// Comment text
        body: String,
        /// Reply to this comment
        #[arg(long)]
        reply_to: Option<String>,
    },

    /// Print article changes as they happen (Ctrl-C to stop)
    Watch,

    /// Show the backend in use and the signed-in user
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    let ctx = match commands::connect(cli.config.as_deref(), cli.log_level.as_deref()).await {
        Ok(ctx) => ctx,
        Err(e) => {
            output::print_error(&format!("{e:#}"), format);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::List {
            search,
            tag,
            page,
            all,
        } => commands::list(&ctx, search, tag, page, all, format).await,
        Commands::Featured => commands::featured(&ctx, format).await,
        Commands::Show { slug } => commands::show(&ctx, &slug, format).await,
        Commands::Create {
            title,
            content,
            content_file,
            author,
            tags,
            images,
            pdf,
            published,
            featured,
        } => {
            let form = commands::CreateForm {
                title,
                content,
                content_file,
                author,
                tags,
                images,
                pdf,
                published,
                featured,
            };
            commands::create(&ctx, form, format).await
        }
        Commands::Publish { id, off } => commands::publish(&ctx, &id, !off, format).await,
        Commands::Feature { id, off } => commands::feature(&ctx, &id, !off, format).await,
        Commands::Delete { id } => commands::delete(&ctx, &id, format).await,
        Commands::Like { slug } => commands::like(&ctx, &slug, format).await,
        Commands::Comment {
            slug,
            body,
            reply_to,
        } => commands::comment(&ctx, &slug, &body, reply_to.as_deref(), format).await,
        Commands::Watch => commands::watch(&ctx, format).await,
        Commands::Status => commands::status(&ctx, format),
    };

    ctx.shutdown();

    if let Err(e) = result {
        output::print_error(&format!("{e:#}"), format);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_list_filters() {
        let cli = Cli::try_parse_from([
            "insights", "list", "--search", "gavel", "--tag", "Legal", "--page", "2", "--all",
        ])
        .unwrap();
        match cli.command {
            Commands::List {
                search,
                tag,
                page,
                all,
            } => {
                assert_eq!(search.as_deref(), Some("gavel"));
                assert_eq!(tag.as_deref(), Some("Legal"));
                assert_eq!(page, 2);
                assert!(all);
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn format_is_global() {
        let cli = Cli::try_parse_from(["insights", "featured", "--format", "json"]).unwrap();
        assert_eq!(cli.format, output::OutputFormat::Json);
    }

    #[test]
    fn content_sources_conflict() {
        let parsed = Cli::try_parse_from([
            "insights",
            "create",
            "--title",
            "5 Ways",
            "--content",
            "x",
            "--content-file",
            "body.txt",
        ]);
        assert!(parsed.is_err());
    }
}
