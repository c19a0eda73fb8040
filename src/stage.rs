//! Named pipeline stages

use crate::error::ReleaseError;
use std::fmt;
use std::str::FromStr;

/// One step of the release pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Static,
    Prebuild,
    Nw,
    Api,
    EsmToCjs,
    Obfuscate,
    Ssl,
    CjsToExe,
    /// Every other stage in [`Stage::SEQUENCE`] order
    All,
}

impl Stage {
    /// Order in which `all` runs the concrete stages
    pub const SEQUENCE: [Stage; 8] = [
        Stage::Ssl,
        Stage::Static,
        Stage::Prebuild,
        Stage::Nw,
        Stage::Api,
        Stage::EsmToCjs,
        Stage::Obfuscate,
        Stage::CjsToExe,
    ];

    /// Every accepted stage, including `all`
    pub const ALL_NAMES: [&'static str; 9] = [
        "static",
        "prebuild",
        "nw",
        "api",
        "esmtocjs",
        "obfuscate",
        "ssl",
        "cjstoexe",
        "all",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Static => "static",
            Stage::Prebuild => "prebuild",
            Stage::Nw => "nw",
            Stage::Api => "api",
            Stage::EsmToCjs => "esmtocjs",
            Stage::Obfuscate => "obfuscate",
            Stage::Ssl => "ssl",
            Stage::CjsToExe => "cjstoexe",
            Stage::All => "all",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Stage::Static => "Building static bundle",
            Stage::Prebuild => "Assembling desktop source",
            Stage::Nw => "Packaging desktop image",
            Stage::Api => "Building API server",
            Stage::EsmToCjs => "Converting server to CommonJS",
            Stage::Obfuscate => "Obfuscating secrets and injecting certificate",
            Stage::Ssl => "Preparing TLS certificate",
            Stage::CjsToExe => "Packaging native executable",
            Stage::All => "Running full release",
        }
    }

    /// Concrete stages this stage expands to
    pub fn expand(self) -> Vec<Stage> {
        match self {
            Stage::All => Self::SEQUENCE.to_vec(),
            single => vec![single],
        }
    }
}

impl FromStr for Stage {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Stage::Static),
            "prebuild" => Ok(Stage::Prebuild),
            "nw" => Ok(Stage::Nw),
            "api" => Ok(Stage::Api),
            "esmtocjs" => Ok(Stage::EsmToCjs),
            "obfuscate" => Ok(Stage::Obfuscate),
            "ssl" => Ok(Stage::Ssl),
            "cjstoexe" => Ok(Stage::CjsToExe),
            "all" => Ok(Stage::All),
            other => Err(ReleaseError::UnknownStage(other.to_string())),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
