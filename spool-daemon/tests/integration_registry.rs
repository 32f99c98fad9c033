//! Building and driving a registry through the public API only.

use spool_daemon::dispatch;
use spool_daemon::errors::{ErrorKind, SpoolError};
use spool_daemon::registry::{
    CommandEntry, CommandGroup, Commands, Context, Outcome, RawArgs, Registry,
};
use spool_daemon::value::{ParamType, Value};
use spool_daemon::workspace;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

/// A namespace whose members read state captured from the definition
struct Deploy {
    region: String,
    builds: AtomicUsize,
}

impl Commands for Deploy {
    fn define(self: Arc<Self>, group: &mut CommandGroup) -> spool_daemon::errors::SpoolResult<()> {
        let this = Arc::clone(&self);
        group.insert_entry(
            CommandEntry::new("target", move |inv| {
                let replicas = inv.args().int("replicas")?;
                let canary = inv.args().bool("canary")?;
                this.builds.fetch_add(1, Ordering::SeqCst);
                Ok(Outcome::value(format!(
                    "{} x{replicas}{}",
                    this.region,
                    if canary { " (canary)" } else { "" }
                )))
            })
            .param("replicas", ParamType::Int)
            .optional_param("canary", ParamType::Bool, false),
        )?;

        let this = Arc::clone(&self);
        group.insert_entry(CommandEntry::new("builds", move |_| {
            #[allow(clippy::cast_possible_wrap)]
            let count = this.builds.load(Ordering::SeqCst) as i64;
            Ok(Outcome::value(count))
        }))
    }
}

struct Tools;

impl Commands for Tools {
    fn define(self: Arc<Self>, group: &mut CommandGroup) -> spool_daemon::errors::SpoolResult<()> {
        group.insert_entry(
            CommandEntry::new("sources", |inv| {
                let pattern = inv.args().string("pattern")?;
                let listing = workspace::listing(inv.context()?.workdir(), pattern)?;
                Ok(Outcome::value(listing))
            })
            .optional_param("pattern", ParamType::String, "**/*.rs")
            .with_context(),
        )
    }
}

fn build() -> Registry {
    let mut builder = Registry::builder();
    builder
        .register(
            CommandEntry::new("deploy", |inv| {
                let region = inv.args().string("region")?.to_string();
                Ok(Outcome::commands(
                    "Deploy",
                    Deploy {
                        region,
                        builds: AtomicUsize::new(0),
                    },
                )?)
            })
            .optional_param("region", ParamType::String, "eu-west")
            .yields_group(),
        )
        .unwrap()
        .register_group("tools", Tools)
        .unwrap();
    builder.build()
}

fn kind(err: &anyhow::Error) -> ErrorKind {
    err.downcast_ref::<SpoolError>()
        .map(SpoolError::kind)
        .expect("registry error")
}

#[test]
fn test_stateful_group_with_typed_arguments() {
    let registry = build();
    let ctx = Context::new(".");

    let outcome = dispatch::call(
        &registry,
        &["deploy", "target", "replicas=3", "--canary", "true"],
        RawArgs::new(),
        &ctx,
    )
    .unwrap();
    assert_eq!(outcome.as_value(), Some(&Value::from("eu-west x3 (canary)")));
}

#[test]
fn test_intermediate_groups_are_rebuilt_per_resolution() {
    let registry = build();
    let ctx = Context::new(".");

    dispatch::call(&registry, &["deploy", "target", "replicas=1"], RawArgs::new(), &ctx).unwrap();
    let builds = dispatch::call(&registry, &["deploy", "builds"], RawArgs::new(), &ctx).unwrap();
    // A fresh Deploy is produced for each walk
    assert_eq!(builds.as_value(), Some(&Value::from(0_i64)));
}

#[test]
fn test_coercion_failures_name_the_argument() {
    let registry = build();
    let ctx = Context::new(".");

    let err = dispatch::call(&registry, &["deploy", "target", "replicas=many"], RawArgs::new(), &ctx)
        .unwrap_err();
    assert_eq!(kind(&err), ErrorKind::ArgumentBinding);
    assert!(err.to_string().contains("replicas"), "{err}");
}

#[test]
fn test_static_group_and_context() {
    let temp = tempdir().unwrap();
    std::fs::create_dir_all(temp.path().join("src/bin")).unwrap();
    std::fs::write(temp.path().join("src/lib.rs"), "").unwrap();
    std::fs::write(temp.path().join("src/bin/main.rs"), "").unwrap();
    std::fs::write(temp.path().join("README.md"), "").unwrap();

    let registry = build();
    let ctx = Context::new(temp.path());

    let rust = dispatch::call(&registry, &["tools", "sources"], RawArgs::new(), &ctx).unwrap();
    assert_eq!(rust.as_value(), Some(&Value::from("src/bin/main.rs\nsrc/lib.rs")));

    let docs = dispatch::call(&registry, &["tools", "sources", "pattern=*.md"], RawArgs::new(), &ctx)
        .unwrap();
    assert_eq!(docs.as_value(), Some(&Value::from("README.md")));

    // Without a context the entry refuses to run
    let resolved = registry.resolve(&["tools", "sources"], None).unwrap();
    let err = registry.invoke(&resolved.entry, &RawArgs::new(), None).unwrap_err();
    assert_eq!(kind(&err), ErrorKind::ArgumentBinding);
}

#[test]
fn test_listing_is_static() {
    let registry = build();
    let paths: Vec<String> = registry.list().into_iter().map(|info| info.path).collect();
    // Lazy groups are listed by their producing entry only
    assert_eq!(paths, vec!["deploy", "tools sources"]);
}

#[test]
fn test_resolution_errors() {
    let registry = build();
    let ctx = Context::new(".");

    let err = registry.resolve(&["deploy", "rollback"], Some(&ctx)).unwrap_err();
    assert_eq!(kind(&err), ErrorKind::NotFound);

    let err = registry.resolve(&["tools"], Some(&ctx)).unwrap_err();
    assert_eq!(kind(&err), ErrorKind::NotFound);

    let err = registry.resolve::<&str>(&[], Some(&ctx)).unwrap_err();
    assert_eq!(kind(&err), ErrorKind::NotFound);
}

#[test]
fn test_handler_errors_pass_through() {
    #[derive(Debug)]
    struct QuotaExceeded;

    impl std::fmt::Display for QuotaExceeded {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "quota exceeded")
        }
    }

    impl std::error::Error for QuotaExceeded {}

    let mut builder = Registry::builder();
    builder
        .register(CommandEntry::new("spend", |_| Err(QuotaExceeded.into())))
        .unwrap();
    let registry = builder.build();

    let err = dispatch::call(&registry, &["spend"], RawArgs::new(), &Context::new(".")).unwrap_err();
    assert!(err.downcast_ref::<QuotaExceeded>().is_some());
    assert!(err.downcast_ref::<SpoolError>().is_none());
}
