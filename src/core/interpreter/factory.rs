//! Interpreter registry and dispatch

use super::{
    BambuFormatInterpreter, CrealityFormatInterpreter, Interpreter, OpenTagInterpreter,
};
use crate::catalog::{CatalogSource, EmptyCatalog};
use crate::config::InterpreterConfig;
use crate::filament::FilamentInfo;
use crate::scan::{DecryptedScanData, TagFormat};
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry of tag interpreters
///
/// Holds one interpreter per supported [`TagFormat`], in registration order
/// (Bambu, Creality, OpenTag). Dispatch prefers the interpreter registered
/// for the reported format and otherwise tries each in turn.
pub struct InterpreterFactory {
    catalog: Arc<dyn CatalogSource>,
    config: InterpreterConfig,
    interpreters: RwLock<Vec<Interpreter>>,
}

impl InterpreterFactory {
    pub fn new(catalog: Arc<dyn CatalogSource>, config: InterpreterConfig) -> Self {
        let interpreters = vec![
            Interpreter::Bambu(BambuFormatInterpreter::new(catalog.current(), &config)),
            Interpreter::Creality(CrealityFormatInterpreter::new(Arc::clone(&catalog))),
            Interpreter::OpenTag(OpenTagInterpreter::new()),
        ];
        debug!("Registered {} tag interpreters", interpreters.len());

        InterpreterFactory {
            catalog,
            config,
            interpreters: RwLock::new(interpreters),
        }
    }

    /// Factory with no catalog data and default tuning
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(EmptyCatalog), InterpreterConfig::default())
    }

    /// Decode a scan with the first interpreter that accepts it
    ///
    /// Returns `None` when nothing matches or the matching interpreter
    /// declines. A panic inside an interpreter is logged and reported as
    /// `None`.
    pub fn interpret(&self, data: &DecryptedScanData) -> Option<FilamentInfo> {
        let interpreters = self.interpreters.read();

        if data.tag_format != TagFormat::Unknown {
            if let Some(preferred) = interpreters
                .iter()
                .find(|i| i.format() == data.tag_format)
                .filter(|i| guarded(i, data, |i, d| i.can_interpret(d)).unwrap_or(false))
            {
                return guarded(preferred, data, |i, d| i.interpret(d)).flatten();
            }
        }

        for interpreter in interpreters.iter() {
            if guarded(interpreter, data, |i, d| i.can_interpret(d)).unwrap_or(false) {
                debug!("{} accepted tag {}", interpreter.name(), data.tag_uid);
                return guarded(interpreter, data, |i, d| i.interpret(d)).flatten();
            }
        }

        debug!(
            "No interpreter matched tag {} ({})",
            data.tag_uid, data.tag_format
        );
        None
    }

    /// Rebuild catalog-dependent interpreters from the current catalog
    ///
    /// Scans decoded afterwards (including re-decoded historical ones) see
    /// the updated mappings.
    pub fn refresh_mappings(&self) {
        let snapshot = self.catalog.current();
        let mut interpreters = self.interpreters.write();
        for slot in interpreters.iter_mut() {
            if let Interpreter::Bambu(_) = slot {
                *slot = Interpreter::Bambu(BambuFormatInterpreter::new(
                    Arc::clone(&snapshot),
                    &self.config,
                ));
            }
        }
        info!("Interpreter mappings refreshed");
    }

    pub fn supported_formats(&self) -> Vec<TagFormat> {
        self.interpreters.read().iter().map(Interpreter::format).collect()
    }

    pub fn supported_interpreter_names(&self) -> Vec<&'static str> {
        self.interpreters.read().iter().map(Interpreter::name).collect()
    }
}

impl Default for InterpreterFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Run `f`, converting a panic into `None`
fn guarded<R>(
    interpreter: &Interpreter,
    data: &DecryptedScanData,
    f: impl FnOnce(&Interpreter, &DecryptedScanData) -> R,
) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(|| f(interpreter, data))) {
        Ok(result) => Some(result),
        Err(_) => {
            warn!(
                "{} panicked on tag {}, treating as no match",
                interpreter.name(),
                data.tag_uid
            );
            None
        }
    }
}
