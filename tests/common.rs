//! Shared fixtures for loader and launch tests
//!
//! Modules in these tests are UTF-8 text. The test host understands two
//! directives, one per line:
//! - `deps: a.B, c.D` resolves each dependency through the loader while defining
//! - `reject` makes definition fail

#![allow(dead_code)]

use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use launchwrap::loader::{
    DefinedModule, HostHandle, Loader, MemorySource, ModuleHost, ModuleName, ModuleSource,
    Transformer,
};

/// Host that records definitions and entry invocations
#[derive(Default)]
pub struct TestHost {
    pub defined: AtomicUsize,
    pub entries: Mutex<Vec<(String, Vec<String>)>>,
}

impl TestHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn defined_count(&self) -> usize {
        self.defined.load(Ordering::SeqCst)
    }
}

impl ModuleHost for TestHost {
    fn define(
        &self,
        loader: &Loader,
        name: &ModuleName,
        bytes: &[u8],
    ) -> anyhow::Result<Option<HostHandle>> {
        let text = std::str::from_utf8(bytes)?;
        for line in text.lines() {
            if let Some(deps) = line.strip_prefix("deps:") {
                for dep in deps.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                    loader.resolve(dep)?;
                }
            } else if line.trim() == "reject" {
                anyhow::bail!("host rejected {}", name);
            }
        }
        self.defined.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Arc::new(text.to_string())))
    }

    fn invoke_entry(&self, module: &DefinedModule, args: &[String]) -> anyhow::Result<()> {
        let text = module.handle_as::<String>().cloned().unwrap_or_default();
        if text.contains("fail-entry") {
            anyhow::bail!("entry of {} exited with failure", module.name());
        }
        self.entries
            .lock()
            .push((module.name().to_string(), args.to_vec()));
        Ok(())
    }
}

/// In-memory source holding `(module name, contents)` pairs
pub fn modules(label: &str, entries: &[(&str, &str)]) -> Arc<MemorySource> {
    let source = MemorySource::new(label);
    for (name, contents) in entries {
        source.insert(ModuleName::new(name).source_path("bin"), contents.as_bytes());
    }
    Arc::new(source)
}

/// Loader with default configuration over `entries`
pub fn loader_with(host: Arc<TestHost>, entries: &[(&str, &str)]) -> Loader {
    let loader = Loader::new(host);
    loader.search_path().add_source(modules("test", entries));
    loader
}

/// Source wrapper counting lookups
pub struct CountingSource {
    pub inner: Arc<dyn ModuleSource>,
    pub lookups: AtomicUsize,
}

impl CountingSource {
    pub fn new(inner: Arc<dyn ModuleSource>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            lookups: AtomicUsize::new(0),
        })
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ModuleSource for CountingSource {
    fn describe(&self) -> String {
        format!("counting:{}", self.inner.describe())
    }

    fn contains(&self, path: &str) -> bool {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.contains(path)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.inner.read(path)
    }
}

/// Appends one byte
pub struct Append(pub &'static str, pub u8);

impl Transformer for Append {
    fn name(&self) -> &str {
        self.0
    }

    fn transform(&self, _module: &ModuleName, mut input: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        input.push(self.1);
        Ok(input)
    }
}

/// Fails on every module
pub struct AlwaysFails;

impl Transformer for AlwaysFails {
    fn name(&self) -> &str {
        "always-fails"
    }

    fn transform(&self, module: &ModuleName, _input: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("refusing to transform {}", module)
    }
}

/// Counts invocations, optionally sleeping in each
pub struct Counting {
    pub calls: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl Counting {
    pub fn new(delay: Duration) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                calls: calls.clone(),
                delay,
            }),
            calls,
        )
    }
}

impl Transformer for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    fn transform(&self, _module: &ModuleName, input: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(input)
    }
}
