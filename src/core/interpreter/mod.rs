//! Tag-format interpreters
//!
//! Each supported format has one interpreter: a pure transformation from a
//! decrypted block map to [`FilamentInfo`]. The set is closed and modelled
//! as the [`Interpreter`] enum; [`factory::InterpreterFactory`] owns the
//! registry and dispatch.
//!
//! Interpreters never fail loudly. Malformed fields fall back to local
//! defaults; records that cannot be decoded at all come back as `None`.

pub mod bambu;
pub mod creality;
pub mod factory;
pub mod opentag;

pub use bambu::BambuFormatInterpreter;
pub use creality::CrealityFormatInterpreter;
pub use factory::InterpreterFactory;
pub use opentag::OpenTagInterpreter;

use crate::error::Result;
use crate::filament::FilamentInfo;
use crate::scan::{DecryptedScanData, TagFormat};
use tracing::debug;

/// One registered format handler
pub enum Interpreter {
    Bambu(BambuFormatInterpreter),
    Creality(CrealityFormatInterpreter),
    OpenTag(OpenTagInterpreter),
}

impl Interpreter {
    pub fn format(&self) -> TagFormat {
        match self {
            Interpreter::Bambu(_) => TagFormat::BambuLab,
            Interpreter::Creality(_) => TagFormat::Creality,
            Interpreter::OpenTag(_) => TagFormat::OpenTag,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Interpreter::Bambu(_) => BambuFormatInterpreter::NAME,
            Interpreter::Creality(_) => CrealityFormatInterpreter::NAME,
            Interpreter::OpenTag(_) => OpenTagInterpreter::NAME,
        }
    }

    pub fn can_interpret(&self, data: &DecryptedScanData) -> bool {
        match self {
            Interpreter::Bambu(i) => i.can_interpret(data),
            Interpreter::Creality(i) => i.can_interpret(data),
            Interpreter::OpenTag(i) => i.can_interpret(data),
        }
    }

    pub fn interpret(&self, data: &DecryptedScanData) -> Option<FilamentInfo> {
        match self {
            Interpreter::Bambu(i) => i.interpret(data),
            Interpreter::Creality(i) => i.interpret(data),
            Interpreter::OpenTag(i) => i.interpret(data),
        }
    }
}

/// Convert an interpreter's internal result into the public `Option`
fn settle(name: &str, data: &DecryptedScanData, result: Result<FilamentInfo>) -> Option<FilamentInfo> {
    match result {
        Ok(info) => {
            debug!("{} decoded tag {}", name, data.tag_uid);
            Some(info)
        }
        Err(e) => {
            debug!("{} declined tag {}: {}", name, data.tag_uid, e);
            None
        }
    }
}
