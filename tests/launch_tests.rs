//! Launch sequence tests
//!
//! Tweak phase ordering, the self-extending tweaker queue, fatal tweaker
//! errors and entry invocation.

use clap::Parser;
use serial_test::serial;
use std::sync::Arc;

use launchwrap::launch::args::{ENV_ENTRY, ENV_SOURCES, ENV_TWEAKERS};
use launchwrap::launch::{
    ArgsMutation, LaunchArgs, LaunchArguments, LaunchError, LaunchRequest, LaunchSequencer,
    TweakContext, TweakStage, Tweaker, TweakerCatalog,
};
use launchwrap::loader::{ExclusionMode, Loader, RegistrationError};

mod common;
use common::*;

/// Configurable tweaker used by every test here
#[derive(Clone, Default)]
struct ScriptedTweaker {
    name: &'static str,
    modules: Vec<(&'static str, &'static str)>,
    append: Option<u8>,
    queue: Vec<&'static str>,
    entry: Option<&'static str>,
    fail_inject: bool,
    fail_mutate: bool,
}

impl Tweaker for ScriptedTweaker {
    fn name(&self) -> &str {
        self.name
    }

    fn inject_into_loader(&mut self, ctx: &TweakContext<'_>) -> anyhow::Result<()> {
        if self.fail_inject {
            anyhow::bail!("{} cannot find its resources", self.name);
        }
        if !self.modules.is_empty() {
            ctx.search_path().add_source(modules(self.name, &self.modules));
        }
        if let Some(byte) = self.append {
            ctx.transformers()
                .register(Arc::new(Append(self.name, byte)))?;
        }
        let mut order: Vec<String> = ctx.blackboard().get_as("order")?.unwrap_or_default();
        order.push(self.name.to_string());
        ctx.blackboard().put("order", &order)?;
        Ok(())
    }

    fn mutate_args(&mut self, current: &LaunchArguments) -> anyhow::Result<ArgsMutation> {
        if self.fail_mutate {
            anyhow::bail!("{} rejected arguments {:?}", self.name, current.args);
        }
        let mut mutation = ArgsMutation::unchanged();
        if let Some(entry) = self.entry {
            mutation = mutation.with_entry(entry);
        }
        for id in &self.queue {
            mutation = mutation.with_tweaker(*id);
        }
        Ok(mutation)
    }
}

fn catalog(tweakers: &[ScriptedTweaker]) -> TweakerCatalog {
    let mut catalog = TweakerCatalog::new();
    for tweaker in tweakers {
        let tweaker = tweaker.clone();
        catalog.register(tweaker.name, move || Ok(Box::new(tweaker.clone())));
    }
    catalog
}

fn request(entry: Option<&str>, tweakers: &[&str], args: &[&str]) -> LaunchRequest {
    LaunchRequest {
        entry_module: entry.map(str::to_string),
        tweakers: tweakers.iter().map(|t| t.to_string()).collect(),
        extra_sources: Vec::new(),
        passthrough_args: args.iter().map(|a| a.to_string()).collect(),
    }
}

fn sequencer(host: Arc<TestHost>, tweakers: &[ScriptedTweaker]) -> LaunchSequencer {
    LaunchSequencer::new(Arc::new(Loader::new(host)), catalog(tweakers))
}

#[test]
fn test_self_extending_queue_runs_before_entry() {
    let host = TestHost::new();
    let first = ScriptedTweaker {
        name: "first",
        modules: vec![("app.Main", "main")],
        queue: vec!["second"],
        ..Default::default()
    };
    let second = ScriptedTweaker {
        name: "second",
        append: Some(b'!'),
        ..Default::default()
    };
    let sequencer = sequencer(host.clone(), &[first, second]);

    let plan = sequencer
        .prepare(request(Some("app.Main"), &["first"], &["--fullscreen"]))
        .unwrap();
    assert_eq!(plan.applied_tweakers, vec!["first", "second"]);
    sequencer.launch(&plan).unwrap();

    let entry = sequencer.loader().cached("app.Main").unwrap();
    assert_eq!(entry.bytes(), b"main!");
    assert_eq!(
        *host.entries.lock(),
        vec![("app.Main".to_string(), vec!["--fullscreen".to_string()])]
    );
}

#[test]
fn test_tweakers_run_in_queue_order() {
    let tweakers: Vec<ScriptedTweaker> = ["a", "b", "c"]
        .into_iter()
        .map(|name| ScriptedTweaker {
            name,
            ..Default::default()
        })
        .collect();
    let sequencer = sequencer(TestHost::new(), &tweakers);

    sequencer
        .prepare(request(Some("app.Main"), &["c", "a", "b"], &[]))
        .unwrap();

    let order: Vec<String> = sequencer.blackboard().get_as("order").unwrap().unwrap();
    assert_eq!(order, vec!["c", "a", "b"]);
}

#[test]
fn test_duplicate_tweakers_are_skipped() {
    let looping = ScriptedTweaker {
        name: "looping",
        queue: vec!["looping"],
        ..Default::default()
    };
    let sequencer = sequencer(TestHost::new(), &[looping]);

    let plan = sequencer
        .prepare(request(Some("app.Main"), &["looping", "looping"], &[]))
        .unwrap();
    assert_eq!(plan.applied_tweakers, vec!["looping"]);
}

#[test]
fn test_unknown_tweaker_is_fatal() {
    let host = TestHost::new();
    let sequencer = sequencer(host.clone(), &[]);

    let err = sequencer
        .run(request(Some("app.Main"), &["missing"], &[]))
        .unwrap_err();
    assert!(matches!(err, LaunchError::UnknownTweaker(id) if id == "missing"));
    assert_eq!(host.defined_count(), 0);
    assert!(!sequencer.loader().is_frozen());
}

#[test]
fn test_tweaker_failures_abort_before_loading() {
    let host = TestHost::new();
    let provider = ScriptedTweaker {
        name: "provider",
        modules: vec![("app.Main", "main")],
        ..Default::default()
    };
    let broken_inject = ScriptedTweaker {
        name: "broken-inject",
        fail_inject: true,
        ..Default::default()
    };
    let broken_mutate = ScriptedTweaker {
        name: "broken-mutate",
        fail_mutate: true,
        ..Default::default()
    };
    let sequencer = sequencer(host.clone(), &[provider, broken_inject, broken_mutate]);

    let err = sequencer
        .run(request(Some("app.Main"), &["provider", "broken-inject"], &[]))
        .unwrap_err();
    assert!(matches!(
        err,
        LaunchError::TweakerFailure { ref tweaker, stage: TweakStage::Inject, .. }
            if tweaker == "broken-inject"
    ));

    let err = sequencer
        .prepare(request(Some("app.Main"), &["broken-mutate"], &["x"]))
        .unwrap_err();
    assert!(matches!(
        err,
        LaunchError::TweakerFailure { stage: TweakStage::MutateArgs, .. }
    ));
    assert_eq!(host.defined_count(), 0);
}

#[test]
fn test_loader_is_frozen_after_tweak_phase() {
    let sequencer = sequencer(
        TestHost::new(),
        &[ScriptedTweaker {
            name: "only",
            ..Default::default()
        }],
    );
    sequencer
        .prepare(request(Some("app.Main"), &["only"], &[]))
        .unwrap();

    let loader = sequencer.loader();
    assert!(loader.is_frozen());
    assert!(loader.register_transformer(Arc::new(AlwaysFails)).is_err());
    assert!(loader
        .exclusions()
        .add_rule("late.", ExclusionMode::Delegate)
        .is_err());
}

#[test]
fn test_tweaker_can_override_entry() {
    let host = TestHost::new();
    let redirect = ScriptedTweaker {
        name: "redirect",
        modules: vec![("app.Main", "main"), ("app.Patched", "patched")],
        entry: Some("app.Patched"),
        ..Default::default()
    };
    let sequencer = sequencer(host.clone(), &[redirect]);

    sequencer
        .run(request(Some("app.Main"), &["redirect"], &["arg"]))
        .unwrap();
    assert_eq!(host.entries.lock()[0].0, "app.Patched");
    assert!(sequencer.loader().cached("app.Main").is_none());
}

#[test]
fn test_missing_entry_module() {
    let sequencer = sequencer(TestHost::new(), &[]);
    assert!(matches!(
        sequencer.prepare(request(None, &[], &[])),
        Err(LaunchError::MissingEntryModule)
    ));
}

#[test]
fn test_unresolvable_entry_is_load_error() {
    let sequencer = sequencer(TestHost::new(), &[]);
    let err = sequencer
        .run(request(Some("app.Nowhere"), &[], &[]))
        .unwrap_err();
    assert!(matches!(err, LaunchError::Load(ref e) if e.is_not_found()));
}

#[test]
fn test_entry_failure_is_reported() {
    let provider = ScriptedTweaker {
        name: "provider",
        modules: vec![("app.Main", "fail-entry")],
        ..Default::default()
    };
    let sequencer = sequencer(TestHost::new(), &[provider]);
    let err = sequencer
        .run(request(Some("app.Main"), &["provider"], &[]))
        .unwrap_err();
    assert!(matches!(err, LaunchError::EntryFailed { .. }));
}

#[test]
fn test_extra_sources_are_added_before_tweakers() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("app")).unwrap();
    std::fs::write(dir.path().join("app/Main.bin"), b"from-disk").unwrap();

    let host = TestHost::new();
    let sequencer = sequencer(host.clone(), &[]);
    let mut req = request(Some("app.Main"), &[], &[]);
    req.extra_sources.push(dir.path().to_path_buf());
    sequencer.run(req).unwrap();

    assert_eq!(
        sequencer.loader().cached("app.Main").unwrap().bytes(),
        b"from-disk"
    );

    let mut missing = request(Some("app.Main"), &[], &[]);
    missing.extra_sources.push(dir.path().join("absent.zip"));
    assert!(matches!(
        self::sequencer(TestHost::new(), &[]).prepare(missing),
        Err(LaunchError::Config(_))
    ));
}

#[test]
fn test_second_tweak_phase_is_rejected() {
    let counter = ScriptedTweaker {
        name: "counter",
        ..Default::default()
    };
    let sequencer = sequencer(TestHost::new(), &[counter]);
    sequencer
        .prepare(request(Some("app.Main"), &["counter"], &[]))
        .unwrap();

    let err = sequencer
        .prepare(request(Some("app.Main"), &["counter"], &[]))
        .unwrap_err();
    assert!(matches!(
        err,
        LaunchError::Registration(RegistrationError::Frozen { .. })
    ));
    let order: Vec<String> = sequencer.blackboard().get_as("order").unwrap().unwrap();
    assert_eq!(order, vec!["counter"]);
}

fn clear_launch_env() {
    for key in [
        ENV_ENTRY,
        ENV_TWEAKERS,
        ENV_SOURCES,
        launchwrap::config::ENV_DUMP_DIR,
        launchwrap::config::ENV_DUMP_STAGES,
        launchwrap::config::ENV_DUMP_CHANGED_ONLY,
    ] {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_run_from_config_file() {
    clear_launch_env();
    let dir = tempfile::tempdir().unwrap();
    let mods = dir.path().join("mods");
    std::fs::create_dir_all(mods.join("app")).unwrap();
    std::fs::write(mods.join("app/Main.bin"), b"main").unwrap();

    let config_path = dir.path().join("launch.toml");
    std::fs::write(
        &config_path,
        format!(
            "[launch]\nentry_module = \"app.Main\"\ntweakers = [\"patcher\"]\nsources = ['{}']\n\n[logging]\nfilter = \"warn\"\n",
            mods.display()
        ),
    )
    .unwrap();

    let args = LaunchArgs::try_parse_from([
        "launchwrap".to_string(),
        "--config".to_string(),
        config_path.display().to_string(),
        "--log-filter".to_string(),
        "launchwrap=debug".to_string(),
        "--".to_string(),
        "--fullscreen".to_string(),
    ])
    .unwrap();

    let host = TestHost::new();
    let patcher = ScriptedTweaker {
        name: "patcher",
        append: Some(b'!'),
        ..Default::default()
    };
    let plan = args.run(catalog(&[patcher]), host.clone()).unwrap();

    assert_eq!(plan.entry_module.as_str(), "app.Main");
    assert_eq!(plan.applied_tweakers, vec!["patcher"]);
    let entries = host.entries.lock();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "app.Main");
    assert_eq!(entries[0].1, vec!["--fullscreen"]);
    assert_eq!(host.defined_count(), 1);
}

#[test]
#[serial]
fn test_run_with_unreadable_config_is_config_error() {
    clear_launch_env();
    let dir = tempfile::tempdir().unwrap();
    let args = LaunchArgs {
        config: Some(dir.path().join("missing.toml")),
        ..Default::default()
    };
    let err = args.run(TweakerCatalog::new(), TestHost::new()).unwrap_err();
    assert!(matches!(err, LaunchError::Config(_)));
}
