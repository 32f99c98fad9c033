//! Command registry
//!
//! Commands are plain handlers registered under a name, optionally nested in
//! groups. A group can also be produced at runtime by invoking an entry that
//! yields one, so deep namespaces are only built when a path walks into them.
//!
//! # Lifecycle
//!
//! ```text
//! RegistryBuilder ──register / register_group──▶ build() ──▶ Registry (read-only)
//!
//! resolve(path):  Root ─select─▶ Group ─select─▶ Entry ─invoke─▶ Group ─select─▶ … ─▶ Entry
//! ```
//!
//! A built `Registry` holds no interior mutability; share it behind an `Arc`
//! and resolve from as many threads as needed.

use crate::client::Client;
use crate::errors::{SpoolError, SpoolResult};
use crate::types::{CommandInfo, ParamInfo};
use crate::value::{ParamType, Value};
use regex::Regex;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Raw argument map: parameter name to unparsed value
pub type RawArgs = BTreeMap<String, String>;

/// Signature every command handler implements
pub type Handler = Arc<dyn Fn(Invocation<'_>) -> anyhow::Result<Outcome> + Send + Sync>;

const ROOT_SCOPE: &str = "<root>";

#[allow(clippy::expect_used)]
fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("static regex is valid"))
}

fn validate_name(name: &str) -> SpoolResult<()> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(SpoolError::invalid_name(
            name,
            "must start with a letter or underscore and contain only letters, digits, '_' or '-'",
        ))
    }
}

/// Parse argument segments into named raw arguments.
///
/// Accepts `key=value`, `--key=value` and `--key value`. Positional values
/// are refused since binding is by name only, and a `--key` directly
/// followed by another `--flag` has no value.
pub fn parse_args<S: AsRef<str>>(segments: &[S]) -> SpoolResult<RawArgs> {
    let mut args = RawArgs::new();
    let mut iter = segments.iter().map(AsRef::<str>::as_ref).peekable();

    while let Some(segment) = iter.next() {
        let (key, value) = if let Some(flag) = segment.strip_prefix("--") {
            match flag.split_once('=') {
                Some((key, value)) => (key, value),
                None => {
                    let value = iter
                        .next_if(|next| !next.starts_with("--"))
                        .ok_or_else(|| SpoolError::malformed_argument(segment))?;
                    (flag, value)
                }
            }
        } else if let Some((key, value)) = segment.split_once('=') {
            (key, value)
        } else {
            return Err(SpoolError::malformed_argument(segment));
        };

        if key.is_empty() {
            return Err(SpoolError::malformed_argument(segment));
        }
        if args.insert(key.to_string(), value.to_string()).is_some() {
            return Err(SpoolError::duplicate_argument(key));
        }
    }

    Ok(args)
}

/// How many leading segments spell arguments rather than command names.
///
/// Command names never start with `--` or contain `=`, so the split is
/// unambiguous. `--key` takes the following segment as its value.
fn argument_run<S: AsRef<str>>(segments: &[S]) -> usize {
    let mut taken = 0;
    while let Some(segment) = segments.get(taken) {
        let segment = segment.as_ref();
        if segment.starts_with("--") {
            taken += 1;
            let takes_value = !segment.contains('=')
                && segments
                    .get(taken)
                    .is_some_and(|next| !next.as_ref().starts_with("--"));
            if takes_value {
                taken += 1;
            }
        } else if segment.contains('=') {
            taken += 1;
        } else {
            break;
        }
    }
    taken
}

/// Handle injected into handlers that ask for it
#[derive(Debug, Clone)]
pub struct Context {
    client: Client,
    workdir: PathBuf,
}

impl Context {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        Self {
            client: Client::new(workdir.clone()),
            workdir,
        }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Directory handlers treat as the current project
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

/// Arguments after binding and coercion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: BTreeMap<String, Value>,
}

impl Arguments {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: &str,
        pick: impl FnOnce(&'a Value) -> Option<T>,
    ) -> anyhow::Result<T> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("argument '{name}' was not bound"))?;
        pick(value).ok_or_else(|| {
            anyhow::anyhow!("argument '{name}' is {}, not {expected}", value.type_name())
        })
    }

    pub fn string(&self, name: &str) -> anyhow::Result<&str> {
        self.typed(name, "a string", Value::as_str)
    }

    pub fn int(&self, name: &str) -> anyhow::Result<i64> {
        self.typed(name, "an int", Value::as_int)
    }

    pub fn float(&self, name: &str) -> anyhow::Result<f64> {
        self.typed(name, "a float", Value::as_float)
    }

    pub fn bool(&self, name: &str) -> anyhow::Result<bool> {
        self.typed(name, "a bool", Value::as_bool)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What a handler receives when it runs
pub struct Invocation<'a> {
    args: &'a Arguments,
    context: Option<&'a Context>,
}

impl<'a> Invocation<'a> {
    #[must_use]
    pub fn args(&self) -> &'a Arguments {
        self.args
    }

    /// The injected context. Always present for entries built `with_context()`.
    pub fn context(&self) -> anyhow::Result<&'a Context> {
        self.context
            .ok_or_else(|| anyhow::anyhow!("handler was invoked without a context"))
    }
}

/// Result of running a handler
#[derive(Debug, Clone)]
pub enum Outcome {
    Value(Value),
    Group(CommandGroup),
}

impl Outcome {
    pub fn value(value: impl Into<Value>) -> Self {
        Outcome::Value(value.into())
    }

    /// Build a group from a `Commands` definition and return it
    pub fn commands<C: Commands>(name: &str, definition: C) -> SpoolResult<Self> {
        Ok(Outcome::Group(CommandGroup::from_commands(name, definition)?))
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Outcome::Value(value) => Some(value),
            Outcome::Group(_) => None,
        }
    }

    #[must_use]
    pub fn as_group(&self) -> Option<&CommandGroup> {
        match self {
            Outcome::Group(group) => Some(group),
            Outcome::Value(_) => None,
        }
    }
}

/// Whether an entry produces a plain value or another namespace level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Yields {
    Value,
    Group,
}

/// Declared parameter of an entry
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
    pub default: Option<Value>,
}

impl Param {
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ParamType, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Some(default.into()),
        }
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// A named, invocable unit
#[derive(Clone)]
pub struct CommandEntry {
    name: String,
    description: Option<String>,
    params: Vec<Param>,
    uses_context: bool,
    yields: Yields,
    handler: Handler,
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("uses_context", &self.uses_context)
            .field("yields", &self.yields)
            .finish_non_exhaustive()
    }
}

impl CommandEntry {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Invocation<'_>) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            params: Vec::new(),
            uses_context: false,
            yields: Yields::Value,
            handler: Arc::new(handler),
        }
    }

    /// Add a required parameter
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(Param::required(name, ty));
        self
    }

    /// Add a parameter that falls back to `default` when omitted
    #[must_use]
    pub fn optional_param(
        mut self,
        name: impl Into<String>,
        ty: ParamType,
        default: impl Into<Value>,
    ) -> Self {
        self.params.push(Param::optional(name, ty, default));
        self
    }

    /// Ask for the execution context to be injected
    #[must_use]
    pub fn with_context(mut self) -> Self {
        self.uses_context = true;
        self
    }

    /// Declare that invoking this entry returns a group
    #[must_use]
    pub fn yields_group(mut self) -> Self {
        self.yields = Yields::Group;
        self
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn parameters(&self) -> &[Param] {
        &self.params
    }

    #[must_use]
    pub fn uses_context(&self) -> bool {
        self.uses_context
    }

    #[must_use]
    pub fn yields(&self) -> Yields {
        self.yields
    }

    fn validate(&self) -> SpoolResult<()> {
        validate_name(&self.name)?;
        let mut seen = Vec::with_capacity(self.params.len());
        for param in &self.params {
            validate_name(&param.name)?;
            if seen.contains(&param.name.as_str()) {
                return Err(SpoolError::duplicate_name(&self.name, &param.name));
            }
            seen.push(param.name.as_str());
        }
        Ok(())
    }

    /// Bind raw arguments by name, coercing each to its declared type.
    ///
    /// Unknown names are rejected rather than ignored.
    pub fn bind(&self, raw: &RawArgs) -> SpoolResult<Arguments> {
        if let Some(unknown) = raw
            .keys()
            .find(|key| !self.params.iter().any(|p| &p.name == *key))
        {
            return Err(SpoolError::unknown_argument(&self.name, unknown));
        }

        let mut values = BTreeMap::new();
        for param in &self.params {
            let value = match (raw.get(&param.name), &param.default) {
                (Some(text), _) => param.ty.coerce(text).ok_or_else(|| {
                    SpoolError::invalid_argument(&self.name, &param.name, param.ty.expectation(), text)
                })?,
                (None, Some(default)) => default.clone(),
                (None, None) => return Err(SpoolError::missing_argument(&self.name, &param.name)),
            };
            values.insert(param.name.clone(), value);
        }

        Ok(Arguments { values })
    }

    /// Bind `raw`, then run the handler.
    ///
    /// Binding failures come back as `SpoolError` inside the `anyhow::Error`;
    /// whatever the handler returns is passed through untouched.
    pub fn invoke(&self, raw: &RawArgs, context: Option<&Context>) -> anyhow::Result<Outcome> {
        let args = self.bind(raw)?;
        let context = if self.uses_context {
            Some(context.ok_or_else(|| SpoolError::context_required(&self.name))?)
        } else {
            None
        };

        log::debug!("Invoking '{}' with {} argument(s)", self.name, args.len());
        (self.handler)(Invocation {
            args: &args,
            context,
        })
    }

    fn info(&self, path: String) -> CommandInfo {
        CommandInfo {
            path,
            description: self.description.clone(),
            params: self
                .params
                .iter()
                .map(|p| ParamInfo {
                    name: p.name.clone(),
                    ty: p.ty,
                    required: p.is_required(),
                })
                .collect(),
            uses_context: self.uses_context,
            yields_group: self.yields == Yields::Group,
        }
    }
}

/// One level of the command tree
#[derive(Debug, Clone)]
pub enum CommandNode {
    Entry(CommandEntry),
    Group(CommandGroup),
}

impl CommandNode {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            CommandNode::Entry(entry) => entry.name(),
            CommandNode::Group(group) => group.name(),
        }
    }
}

/// Types that describe a namespace of commands.
///
/// Implementors add their members to the (empty, already named) group.
/// Handlers that need the definition's state can capture a clone of `self`.
pub trait Commands: Send + Sync + 'static {
    fn define(self: Arc<Self>, group: &mut CommandGroup) -> SpoolResult<()>;
}

/// Named collection of entries and nested groups, in insertion order
#[derive(Debug, Clone)]
pub struct CommandGroup {
    name: String,
    children: Vec<CommandNode>,
    index: HashMap<String, usize>,
}

impl CommandGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build a group named `name` from a `Commands` definition
    pub fn from_commands<C: Commands>(name: &str, definition: C) -> SpoolResult<Self> {
        validate_name(name)?;
        let mut group = CommandGroup::new(name);
        Arc::new(definition).define(&mut group)?;
        Ok(group)
    }

    fn insert(&mut self, node: CommandNode) -> SpoolResult<()> {
        let name = node.name().to_string();
        if self.index.contains_key(&name) {
            return Err(SpoolError::duplicate_name(&self.name, &name));
        }
        self.index.insert(name, self.children.len());
        self.children.push(node);
        Ok(())
    }

    pub fn insert_entry(&mut self, entry: CommandEntry) -> SpoolResult<()> {
        entry.validate()?;
        self.insert(CommandNode::Entry(entry))
    }

    pub fn insert_group(&mut self, group: CommandGroup) -> SpoolResult<()> {
        validate_name(&group.name)?;
        self.insert(CommandNode::Group(group))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CommandNode> {
        self.index.get(name).map(|&idx| &self.children[idx])
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.children.iter().map(CommandNode::name).collect()
    }

    fn collect_info(&self, prefix: &[String], out: &mut Vec<CommandInfo>) {
        for child in &self.children {
            let mut path = prefix.to_vec();
            path.push(child.name().to_string());
            match child {
                CommandNode::Entry(entry) => out.push(entry.info(path.join(" "))),
                CommandNode::Group(group) => group.collect_info(&path, out),
            }
        }
    }

    /// Flattened description of this group's static members
    #[must_use]
    pub fn describe(&self) -> Vec<CommandInfo> {
        let mut out = Vec::new();
        self.collect_info(&[], &mut out);
        out
    }
}

/// A path resolved down to a single entry
#[derive(Debug, Clone)]
pub struct Resolved {
    pub entry: CommandEntry,
    /// Segments consumed to reach `entry`
    pub path: Vec<String>,
    /// Segments left over, reserved for the entry's own arguments
    pub residual: Vec<String>,
}

/// Collects registrations, then freezes into a `Registry`
#[derive(Debug)]
pub struct RegistryBuilder {
    root: CommandGroup,
}

impl RegistryBuilder {
    /// Register a top-level entry
    pub fn register(&mut self, entry: CommandEntry) -> SpoolResult<&mut Self> {
        log::debug!("Registering command '{}'", entry.name());
        self.root.insert_entry(entry)?;
        Ok(self)
    }

    /// Register a top-level group built from a `Commands` definition
    pub fn register_group<C: Commands>(&mut self, name: &str, definition: C) -> SpoolResult<&mut Self> {
        log::debug!("Registering group '{name}'");
        // Check before `define` runs so a collision never builds the group
        if self.root.get(name).is_some() {
            return Err(SpoolError::duplicate_name(ROOT_SCOPE, name));
        }
        let group = CommandGroup::from_commands(name, definition)?;
        self.root.insert_group(group)?;
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> Registry {
        log::info!("Command registry built with {} top-level names", self.root.children.len());
        Registry { root: self.root }
    }
}

/// Immutable command tree
#[derive(Debug, Clone)]
pub struct Registry {
    root: CommandGroup,
}

impl Registry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            root: CommandGroup::new(ROOT_SCOPE),
        }
    }

    #[must_use]
    pub fn root(&self) -> &CommandGroup {
        &self.root
    }

    /// Walk `path` down to an entry.
    ///
    /// A group-yielding entry met before the end of the path is invoked with
    /// `context` and with the `key=value` / `--key value` segments that
    /// directly follow it (none means no arguments), and the walk continues
    /// into the group it returns. A value-yielding entry ends the walk;
    /// whatever segments remain are returned as `residual`. So does a
    /// group-yielding entry followed only by argument segments.
    pub fn resolve<S: AsRef<str>>(
        &self,
        path: &[S],
        context: Option<&Context>,
    ) -> anyhow::Result<Resolved> {
        let mut group: Cow<'_, CommandGroup> = Cow::Borrowed(&self.root);
        let mut walked: Vec<String> = Vec::with_capacity(path.len());
        let mut pos = 0;

        loop {
            let Some(segment) = path.get(pos) else {
                return Err(SpoolError::incomplete_path(&walked, &group.names()).into());
            };
            let segment: &str = segment.as_ref();

            let node = group
                .get(segment)
                .ok_or_else(|| SpoolError::not_found(&walked, segment))?;
            walked.push(segment.to_string());
            pos += 1;

            let next = match node {
                CommandNode::Group(child) => child.clone(),
                CommandNode::Entry(entry) => {
                    let rest = &path[pos..];
                    let own = match entry.yields() {
                        Yields::Value => rest.len(),
                        Yields::Group => argument_run(rest),
                    };
                    if own == rest.len() {
                        return Ok(Resolved {
                            entry: entry.clone(),
                            path: walked,
                            residual: rest.iter().map(|s| s.as_ref().to_string()).collect(),
                        });
                    }

                    let args = parse_args(&rest[..own])?;
                    pos += own;
                    match entry.invoke(&args, context)? {
                        Outcome::Group(produced) => produced,
                        Outcome::Value(_) => {
                            return Err(SpoolError::unexpected_outcome(entry.name()).into());
                        }
                    }
                }
            };
            group = Cow::Owned(next);
        }
    }

    /// Bind and run `entry`
    pub fn invoke(
        &self,
        entry: &CommandEntry,
        args: &RawArgs,
        context: Option<&Context>,
    ) -> anyhow::Result<Outcome> {
        entry.invoke(args, context)
    }

    /// Every statically registered entry, as space-separated paths
    #[must_use]
    pub fn list(&self) -> Vec<CommandInfo> {
        self.root.describe()
    }
}
