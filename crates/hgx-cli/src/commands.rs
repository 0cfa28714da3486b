use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use tracing::debug;

use hgx_golix::Primitive;
use hgx_persist::{DiskLibrarian, Enforcer, IngestPipeline, Lawyer, Librarian};
use hgx_types::Ghid;

use crate::cli::*;
use crate::config::HgxConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = HgxConfig::resolve(cli.config.as_deref(), cli.cache_dir)?;
    let (librarian, restored) = open_cache(&config).await?;

    match cli.command {
        Command::Inspect(_) => cmd_inspect(librarian.as_ref(), restored).await,
        Command::Show(args) => cmd_show(librarian.as_ref(), &args.ghid).await,
        Command::Status(args) => cmd_status(librarian.as_ref(), &args.ghid),
        Command::Verify(args) => cmd_verify(librarian, args).await,
    }
}

async fn open_cache(config: &HgxConfig) -> anyhow::Result<(Arc<dyn Librarian>, usize)> {
    let dir = config.cache_dir()?;
    let librarian = DiskLibrarian::open(dir, &config.librarian)
        .await
        .with_context(|| format!("opening cache {}", dir.display()))?;
    let restored = librarian.restore().await?;
    debug!(dir = %dir.display(), restored, "cache opened");
    Ok((Arc::new(librarian), restored))
}

fn parse_ghid(text: &str) -> anyhow::Result<Ghid> {
    Ghid::from_hex(text.trim()).with_context(|| format!("not a ghid: {text}"))
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Number of cached primitives per kind.
async fn count_kinds(librarian: &dyn Librarian) -> anyhow::Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for ghid in librarian.walk_cache().await? {
        let primitive = librarian.summarize(&ghid).await?;
        *counts.entry(primitive.kind().to_string()).or_insert(0) += 1;
    }
    Ok(counts)
}

fn describe(primitive: &Primitive) -> Vec<(&'static str, String)> {
    let mut fields = vec![("kind", primitive.kind().to_string())];
    match primitive {
        Primitive::Identity(decl) => {
            fields.push(("ghid", decl.ghid.to_hex()));
            fields.push(("key", hex_key(&decl.verifying_key)));
        }
        Primitive::Container(c) => {
            fields.push(("ghid", c.ghid.to_hex()));
            fields.push(("author", c.author.to_hex()));
        }
        Primitive::StaticBinding(b) => {
            fields.push(("ghid", b.ghid.to_hex()));
            fields.push(("author", b.author.to_hex()));
            fields.push(("target", b.target.to_hex()));
        }
        Primitive::DynamicBinding(b) => {
            fields.push(("ghid", b.ghid.to_hex()));
            fields.push(("frame", b.frame_ghid.to_hex()));
            fields.push(("author", b.author.to_hex()));
            fields.push(("counter", b.counter.to_string()));
            for (i, target) in b.target_vector.iter().enumerate() {
                fields.push((if i == 0 { "target" } else { "history" }, target.to_hex()));
            }
        }
        Primitive::Debinding(d) => {
            fields.push(("ghid", d.ghid.to_hex()));
            fields.push(("author", d.author.to_hex()));
            fields.push(("target", d.target.to_hex()));
        }
        Primitive::Request(r) => {
            fields.push(("ghid", r.ghid.to_hex()));
            fields.push(("author", r.author.to_hex()));
            fields.push(("recipient", r.recipient.to_hex()));
        }
    }
    fields
}

fn hex_key(key: &[u8; 32]) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}

/// Every cached primitive that fails its signature check or the structural
/// and authorship rules, with the reason.
async fn find_invalid(librarian: Arc<dyn Librarian>) -> anyhow::Result<Vec<(Ghid, String)>> {
    let mut checker = IngestPipeline::empty(Arc::clone(&librarian));
    checker.add_stage(Box::new(Enforcer));
    checker.add_stage(Box::new(Lawyer));

    let mut failures = Vec::new();
    for ghid in librarian.walk_cache().await? {
        let data = librarian.retrieve(&ghid).await?;
        let primitive = librarian.summarize(&ghid).await?;
        if let Err(e) = checker.verify_signature(&primitive, &data).await {
            failures.push((ghid, e.to_string()));
            continue;
        }
        if let Err(e) = checker.validate(&primitive).await {
            failures.push((ghid, e.to_string()));
        }
    }
    Ok(failures)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_inspect(librarian: &dyn Librarian, restored: usize) -> anyhow::Result<()> {
    let counts = count_kinds(librarian).await?;
    println!("{} Restored {} primitives", "✓".green().bold(), restored.to_string().bold());
    for (kind, count) in &counts {
        println!("  {:<16} {}", kind.cyan(), count);
    }
    Ok(())
}

async fn cmd_show(librarian: &dyn Librarian, ghid: &str) -> anyhow::Result<()> {
    let ghid = parse_ghid(ghid)?;
    let primitive = librarian.summarize(&ghid).await?;
    for (name, value) in describe(&primitive) {
        println!("{:>10}: {}", name.bold(), value);
    }
    Ok(())
}

fn cmd_status(librarian: &dyn Librarian, ghid: &str) -> anyhow::Result<()> {
    let ghid = parse_ghid(ghid)?;
    println!("{}", ghid.to_hex().yellow().bold());
    if let Some(frame) = librarian.resolve_frame(&ghid) {
        println!("  {} {}", "frame:".dimmed(), frame.to_hex());
    }
    let sections = [
        ("bound by", librarian.bind_status(&ghid)),
        ("debound by", librarian.debind_status(&ghid)),
        ("requests", librarian.recipient_status(&ghid)),
    ];
    for (label, ghids) in sections {
        println!("  {} {}", format!("{label}:").dimmed(), ghids.len());
        for g in ghids {
            println!("    {}", g.to_hex());
        }
    }
    Ok(())
}

async fn cmd_verify(librarian: Arc<dyn Librarian>, args: VerifyArgs) -> anyhow::Result<()> {
    let failures = find_invalid(librarian).await?;
    if failures.is_empty() {
        println!("{} All cached primitives verified", "✓".green().bold());
        return Ok(());
    }
    for (ghid, reason) in &failures {
        println!("{} {}: {}", "✗".red().bold(), ghid.short_hex().yellow(), reason);
    }
    if args.strict {
        anyhow::bail!("{} primitives failed verification", failures.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use hgx_core::{Gao, GaoContext, JsonState};
    use hgx_golix::{FirstParty, IdentityProvider};
    use hgx_persist::{Ingest, LibrarianConfig};

    /// A cache directory holding one identity and one two-frame object.
    async fn populated_cache() -> (tempfile::TempDir, Arc<FirstParty>) {
        let dir = tempfile::tempdir().unwrap();
        let librarian: Arc<dyn Librarian> = Arc::new(
            DiskLibrarian::open(dir.path(), &LibrarianConfig::default())
                .await
                .unwrap(),
        );
        let pipeline = Arc::new(IngestPipeline::new(librarian));
        let party = Arc::new(FirstParty::generate().unwrap());
        let decl = party.declaration();
        pipeline
            .direct_ingest(&decl.to_primitive(), &decl.bytes, false)
            .await
            .unwrap();

        let ctx = GaoContext::new(party.clone(), pipeline);
        let gao = Gao::new_dynamic(&ctx, JsonState("hello".to_string()));
        gao.push().await.unwrap();
        gao.set_state(JsonState("world".to_string()));
        gao.push().await.unwrap();
        (dir, party)
    }

    async fn reopen(dir: &tempfile::TempDir) -> Arc<dyn Librarian> {
        let config = HgxConfig::resolve(None, Some(dir.path().to_path_buf())).unwrap();
        open_cache(&config).await.unwrap().0
    }

    #[tokio::test]
    async fn inspect_counts_kinds() {
        let (dir, _) = populated_cache().await;
        let librarian = reopen(&dir).await;
        let counts = count_kinds(librarian.as_ref()).await.unwrap();

        assert_eq!(counts.get("identity"), Some(&1));
        assert_eq!(counts.get("container"), Some(&2));
        // The superseded frame was retired.
        assert_eq!(counts.get("dynamic-binding"), Some(&1));
    }

    #[tokio::test]
    async fn clean_cache_verifies() {
        let (dir, _) = populated_cache().await;
        assert!(find_invalid(reopen(&dir).await).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_author_is_reported() {
        let (dir, _) = populated_cache().await;
        let librarian = reopen(&dir).await;

        let stranger = FirstParty::generate().unwrap();
        let container = stranger
            .make_container(b"x", &stranger.new_secret())
            .unwrap();
        librarian
            .store(&container.to_primitive(), &container.bytes)
            .await
            .unwrap();

        let failures = find_invalid(librarian).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, container.primitive.ghid);
    }

    #[tokio::test]
    async fn describe_dynamic_binding() {
        let (dir, party) = populated_cache().await;
        let librarian = reopen(&dir).await;
        let mut frame = None;
        for ghid in librarian.walk_cache().await.unwrap() {
            if let Primitive::DynamicBinding(b) = librarian.summarize(&ghid).await.unwrap() {
                frame = Some(b);
            }
        }
        let frame = frame.unwrap();
        let fields = describe(&Primitive::DynamicBinding(frame.clone()));

        assert_eq!(fields[0], ("kind", "dynamic-binding".to_string()));
        assert!(fields.contains(&("counter", "1".to_string())));
        assert!(fields.contains(&("author", party.whoami().to_hex())));
        assert!(fields.contains(&("target", frame.target().to_hex())));
        assert_eq!(fields.iter().filter(|(name, _)| *name == "history").count(), 1);
    }

    #[test]
    fn ghid_parsing() {
        let ghid = Ghid::from_bytes(b"x");
        assert_eq!(parse_ghid(&format!(" {} ", ghid.to_hex())).unwrap(), ghid);
        assert!(parse_ghid("zz").is_err());
    }
}
