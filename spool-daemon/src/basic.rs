//! The basic project: a small command set exercising files, directories,
//! the host view and three levels of nested namespaces.
//!
//! ```text
//! test_file <file_prefix>
//! test_dir <dir_prefix>
//! test_imported_project_dir
//! test_export_local_dir
//! level1 level2 level3 foo|bar
//! ```

use crate::errors::SpoolResult;
use crate::registry::{CommandEntry, CommandGroup, Commands, Outcome, Registry};
use crate::value::ParamType;
use crate::workspace;
use std::sync::Arc;

/// Build the registry holding every basic-project command
pub fn registry() -> SpoolResult<Registry> {
    let mut builder = Registry::builder();
    builder
        .register(test_file())?
        .register(test_dir())?
        .register(test_imported_project_dir())?
        .register(test_export_local_dir())?
        .register(level1())?;
    Ok(builder.build())
}

fn test_file() -> CommandEntry {
    CommandEntry::new("test_file", |inv| {
        let name = format!("{}foo.txt", inv.args().string("file_prefix")?);
        let file = inv
            .context()?
            .client()
            .directory()
            .with_new_file(&name, "foo\n")?
            .file(&name)?;
        Ok(Outcome::value(file))
    })
    .param("file_prefix", ParamType::String)
    .with_context()
    .describe("Create foo.txt under a prefix and return it")
}

fn test_dir() -> CommandEntry {
    CommandEntry::new("test_dir", |inv| {
        let prefix = inv.args().string("dir_prefix")?;
        let dir = inv
            .context()?
            .client()
            .directory()
            .with_new_directory(&format!("{prefix}subdir"))?
            .with_new_file(&format!("{prefix}subdir/subbar1.txt"), "subbar1\n")?
            .with_new_file(&format!("{prefix}subdir/subbar2.txt"), "subbar2\n")?
            .with_new_file(&format!("{prefix}bar1.txt"), "bar1\n")?
            .with_new_file(&format!("{prefix}bar2.txt"), "bar2\n")?;
        Ok(Outcome::value(dir))
    })
    .param("dir_prefix", ParamType::String)
    .with_context()
    .describe("Build a small directory tree under a prefix")
}

fn test_imported_project_dir() -> CommandEntry {
    CommandEntry::new("test_imported_project_dir", |inv| {
        let listing = workspace::listing(inv.context()?.workdir(), "**/*")?;
        Ok(Outcome::value(listing))
    })
    .with_context()
    .describe("List every path in the project directory")
}

fn test_export_local_dir() -> CommandEntry {
    CommandEntry::new("test_export_local_dir", |inv| {
        let dir = inv.context()?.client().host().directory(".")?;
        Ok(Outcome::value(dir))
    })
    .with_context()
    .describe("Load the project directory from the host")
}

fn level1() -> CommandEntry {
    CommandEntry::new("level1", |_| Ok(Outcome::commands("Level1", Level1)?)).yields_group()
}

struct Level1;

impl Commands for Level1 {
    fn define(self: Arc<Self>, group: &mut CommandGroup) -> SpoolResult<()> {
        group.insert_entry(
            CommandEntry::new("level2", |_| Ok(Outcome::commands("Level2", Level2)?)).yields_group(),
        )
    }
}

struct Level2;

impl Commands for Level2 {
    fn define(self: Arc<Self>, group: &mut CommandGroup) -> SpoolResult<()> {
        group.insert_entry(
            CommandEntry::new("level3", |_| Ok(Outcome::commands("Level3", Level3)?)).yields_group(),
        )
    }
}

struct Level3;

impl Commands for Level3 {
    fn define(self: Arc<Self>, group: &mut CommandGroup) -> SpoolResult<()> {
        group.insert_entry(CommandEntry::new("foo", |_| {
            Ok(Outcome::value("hello from foo"))
        }))?;
        group.insert_entry(CommandEntry::new("bar", |_| {
            Ok(Outcome::value("hello from bar"))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, SpoolError};
    use crate::registry::{Context, RawArgs};
    use crate::value::Value;
    use std::fs;
    use tempfile::tempdir;

    fn raw(pairs: &[(&str, &str)]) -> RawArgs {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn run(path: &[&str], args: &[(&str, &str)], ctx: &Context) -> Outcome {
        let registry = registry().unwrap();
        let resolved = registry.resolve(path, Some(ctx)).unwrap();
        registry.invoke(&resolved.entry, &raw(args), Some(ctx)).unwrap()
    }

    #[test]
    fn test_every_top_level_name_resolves() {
        let registry = registry().unwrap();
        let ctx = Context::new(".");
        for name in registry.root().names() {
            let resolved = registry.resolve(&[name], Some(&ctx)).unwrap();
            assert_eq!(resolved.entry.name(), name);
        }
        assert_eq!(registry.root().names().len(), 5);
    }

    #[test]
    fn test_nested_foo_and_bar() {
        let ctx = Context::new(".");
        let foo = run(&["level1", "level2", "level3", "foo"], &[], &ctx);
        assert_eq!(foo.as_value(), Some(&Value::from("hello from foo")));
        let bar = run(&["level1", "level2", "level3", "bar"], &[], &ctx);
        assert_eq!(bar.as_value(), Some(&Value::from("hello from bar")));
    }

    #[test]
    fn test_level1_alone_returns_a_group() {
        let ctx = Context::new(".");
        let outcome = run(&["level1"], &[], &ctx);
        let group = outcome.as_group().unwrap();
        assert_eq!(group.names(), vec!["level2"]);
    }

    #[test]
    fn test_nested_unknown_segment() {
        let registry = registry().unwrap();
        let err = registry
            .resolve(&["level1", "level2", "level4"], None)
            .unwrap_err();
        let spool = err.downcast_ref::<SpoolError>().unwrap();
        assert_eq!(spool.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_file_without_prefix() {
        let ctx = Context::new(".");
        let outcome = run(&["test_file"], &[("file_prefix", "")], &ctx);
        let file = outcome.as_value().and_then(Value::as_file).unwrap();
        assert_eq!(file.name(), "foo.txt");
        assert_eq!(file.text(), Some("foo\n"));
    }

    #[test]
    fn test_file_with_nested_prefix() {
        let ctx = Context::new(".");
        let outcome = run(&["test_file"], &[("file_prefix", "a/b/")], &ctx);
        let file = outcome.as_value().and_then(Value::as_file).unwrap();
        assert_eq!(file.name(), "foo.txt");
    }

    #[test]
    fn test_dir_with_prefix() {
        let ctx = Context::new(".");
        let outcome = run(&["test_dir"], &[("dir_prefix", "x/")], &ctx);
        let dir = outcome.as_value().and_then(Value::as_directory).unwrap();

        let expected = [
            ("x/subdir/subbar1.txt", "subbar1\n"),
            ("x/subdir/subbar2.txt", "subbar2\n"),
            ("x/bar1.txt", "bar1\n"),
            ("x/bar2.txt", "bar2\n"),
        ];
        for (path, contents) in expected {
            assert_eq!(dir.file(path).unwrap().text(), Some(contents), "{path}");
        }
        assert_eq!(dir.file_paths().len(), 4);
    }

    #[test]
    fn test_binding_errors_on_basic_commands() {
        let registry = registry().unwrap();
        let ctx = Context::new(".");
        let resolved = registry.resolve(&["test_dir"], Some(&ctx)).unwrap();

        let missing = registry
            .invoke(&resolved.entry, &RawArgs::new(), Some(&ctx))
            .unwrap_err();
        assert_eq!(
            missing.downcast_ref::<SpoolError>().unwrap().kind(),
            ErrorKind::ArgumentBinding
        );

        let unknown = registry
            .invoke(
                &resolved.entry,
                &raw(&[("dir_prefix", "x/"), ("dir_prefx", "y/")]),
                Some(&ctx),
            )
            .unwrap_err();
        assert_eq!(
            unknown.downcast_ref::<SpoolError>().unwrap().kind(),
            ErrorKind::ArgumentBinding
        );
    }

    #[test]
    fn test_nested_leaf_rejects_arguments() {
        let ctx = Context::new(".");
        let registry = registry().unwrap();
        let resolved = registry
            .resolve(&["level1", "level2", "level3", "foo"], Some(&ctx))
            .unwrap();
        let err = registry
            .invoke(&resolved.entry, &raw(&[("loud", "true")]), Some(&ctx))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<SpoolError>().unwrap().kind(),
            ErrorKind::ArgumentBinding
        );
    }

    #[test]
    fn test_imported_project_dir_lists_tree() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("pkg")).unwrap();
        fs::write(temp.path().join("main.py"), "").unwrap();
        fs::write(temp.path().join("pkg/mod.py"), "").unwrap();

        let ctx = Context::new(temp.path());
        let outcome = run(&["test_imported_project_dir"], &[], &ctx);
        assert_eq!(
            outcome.as_value(),
            Some(&Value::from("main.py\npkg\npkg/mod.py"))
        );
    }

    #[test]
    fn test_export_local_dir_loads_host_tree() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("data")).unwrap();
        fs::write(temp.path().join("data/a.txt"), "a\n").unwrap();

        let ctx = Context::new(temp.path());
        let outcome = run(&["test_export_local_dir"], &[], &ctx);
        let dir = outcome.as_value().and_then(Value::as_directory).unwrap();
        assert_eq!(dir.paths(), vec!["data", "data/a.txt"]);
        assert_eq!(dir.file("data/a.txt").unwrap().text(), Some("a\n"));
    }
}
