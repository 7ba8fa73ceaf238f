//! Shared scripted-module machinery for integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use marquee::core::{Module, ModuleError, ModuleFactory, ModuleRegistry, Remover};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

/// A module whose behavior is scripted from the test.
pub struct ScriptedModule {
    kind: &'static str,
    alive: AtomicBool,
    on_top: AtomicBool,
    fail_play: AtomicBool,
    fail_suspend: AtomicBool,
    fail_remove: AtomicBool,
    /// When set, `terminate` leaves the module reporting alive, simulating a
    /// process that will not die.
    survives_terminate: AtomicBool,
    log: Mutex<Vec<String>>,
    parameters: Mutex<Map<String, Value>>,
    remover: Mutex<Option<Remover>>,
}

impl ScriptedModule {
    pub fn new(kind: &'static str) -> Arc<Self> {
        Arc::new(Self {
            kind,
            alive: AtomicBool::new(true),
            on_top: AtomicBool::new(false),
            fail_play: AtomicBool::new(false),
            fail_suspend: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            survives_terminate: AtomicBool::new(false),
            log: Mutex::new(Vec::new()),
            parameters: Mutex::new(Map::new()),
            remover: Mutex::new(None),
        })
    }

    pub fn fail_play(&self, fail: bool) {
        self.fail_play.store(fail, Ordering::SeqCst);
    }

    pub fn fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    pub fn survives_terminate(&self, survives: bool) {
        self.survives_terminate.store(survives, Ordering::SeqCst);
    }

    pub fn set_parameter(&self, name: &str, value: Value) {
        self.parameters.lock().insert(name.to_owned(), value);
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.log.lock().iter().filter(|c| c.as_str() == op).count()
    }

    /// Simulate the module finishing on its own: the process exits and the
    /// module asks its owning container to evict it.
    pub async fn finish_naturally(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.on_top.store(false, Ordering::SeqCst);
        let remover = self.remover.lock().clone();
        if let Some(remover) = remover {
            remover.invoke().await;
        }
    }
}

#[async_trait]
impl Module for ScriptedModule {
    fn kind(&self) -> &str {
        self.kind
    }

    fn alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn is_on_top(&self) -> bool {
        self.on_top.load(Ordering::SeqCst)
    }

    async fn play(&self) -> Result<(), ModuleError> {
        self.log.lock().push("play".into());
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(ModuleError::Lifecycle("scripted play failure".into()));
        }
        self.on_top.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn suspend(&self) -> Result<(), ModuleError> {
        self.log.lock().push("suspend".into());
        if self.fail_suspend.load(Ordering::SeqCst) {
            return Err(ModuleError::Lifecycle("scripted suspend failure".into()));
        }
        self.on_top.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self) -> Result<(), ModuleError> {
        self.log.lock().push("remove".into());
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(ModuleError::Lifecycle("scripted remove failure".into()));
        }
        self.alive.store(false, Ordering::SeqCst);
        self.on_top.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn terminate(&self) {
        self.log.lock().push("terminate".into());
        if !self.survives_terminate.load(Ordering::SeqCst) {
            self.alive.store(false, Ordering::SeqCst);
            self.on_top.store(false, Ordering::SeqCst);
        }
    }

    async fn tell(&self, cmd: &str, args: Value) -> Result<Value, ModuleError> {
        self.log.lock().push(format!("tell:{cmd}"));
        if cmd == "reject" {
            return Err(ModuleError::Command("scripted rejection".into()));
        }
        Ok(json!({ "cmd": cmd, "args": args }))
    }

    fn read_parameters(&self, names: &[String]) -> Map<String, Value> {
        let parameters = self.parameters.lock();
        names
            .iter()
            .filter_map(|name| parameters.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }
}

/// Factory producing scripted modules and retaining them for inspection.
pub struct ScriptedFactory {
    kind: &'static str,
    fail_construct: AtomicBool,
    fail_next_play: AtomicBool,
    stubborn_next: AtomicBool,
    built: Mutex<Vec<Arc<ScriptedModule>>>,
}

impl ScriptedFactory {
    pub fn new(kind: &'static str) -> Arc<Self> {
        Arc::new(Self {
            kind,
            fail_construct: AtomicBool::new(false),
            fail_next_play: AtomicBool::new(false),
            stubborn_next: AtomicBool::new(false),
            built: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_construct(&self, fail: bool) {
        self.fail_construct.store(fail, Ordering::SeqCst);
    }

    /// The next constructed module comes out with a failing `play`.
    pub fn fail_next_play(&self) {
        self.fail_next_play.store(true, Ordering::SeqCst);
    }

    /// The next constructed module fails every lifecycle action and shrugs
    /// off `terminate`.
    pub fn stubborn_next(&self) {
        self.stubborn_next.store(true, Ordering::SeqCst);
    }

    /// The most recently constructed module.
    pub fn last(&self) -> Arc<ScriptedModule> {
        self.built.lock().last().cloned().expect("no module built")
    }

    /// The `index`-th constructed module.
    pub fn built_at(&self, index: usize) -> Arc<ScriptedModule> {
        self.built
            .lock()
            .get(index)
            .cloned()
            .expect("no module at index")
    }

    pub fn built_count(&self) -> usize {
        self.built.lock().len()
    }
}

#[async_trait]
impl ModuleFactory for ScriptedFactory {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn construct(
        &self,
        _args: Value,
        remover: Remover,
    ) -> Result<Arc<dyn Module>, ModuleError> {
        if self.fail_construct.load(Ordering::SeqCst) {
            return Err(ModuleError::Construction(
                "scripted construction failure".into(),
            ));
        }
        let module = ScriptedModule::new(self.kind);
        if self.fail_next_play.swap(false, Ordering::SeqCst) {
            module.fail_play(true);
        }
        if self.stubborn_next.swap(false, Ordering::SeqCst) {
            module.fail_play(true);
            module.fail_remove(true);
            module.survives_terminate(true);
        }
        *module.remover.lock() = Some(remover);
        self.built.lock().push(Arc::clone(&module));
        Ok(module)
    }
}

/// Registry over the given factories.
pub fn registry_of(factories: &[&Arc<ScriptedFactory>]) -> ModuleRegistry {
    ModuleRegistry::new(
        factories
            .iter()
            .map(|f| Arc::clone(*f) as Arc<dyn ModuleFactory>)
            .collect(),
    )
}
