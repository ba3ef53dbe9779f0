//! Flag extraction for wrapped package-manager commands
//!
//! rtbridge shares the command line with the wrapped tool. The flags it
//! understands are pulled out of the argument list; everything else is
//! passed through untouched.

use crate::config::defaults::DEFAULT_THREADS;
use crate::error::BridgeError;

/// Output format of a security scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanOutputFormat {
    #[default]
    Table,
    Json,
}

impl std::str::FromStr for ScanOutputFormat {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(BridgeError::ConfigInvalid(format!(
                "only the following output formats are supported: table, json. Got '{other}'"
            ))),
        }
    }
}

/// Build-info coordinates given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConfiguration {
    pub build_name: Option<String>,
    pub build_number: Option<String>,
    pub project: Option<String>,
    /// Overrides the module id derived from `package.json`
    pub module: Option<String>,
}

impl BuildConfiguration {
    /// Build info is collected when both name and number are set
    pub fn is_collect_build_info(&self) -> bool {
        self.build_name.is_some() && self.build_number.is_some()
    }

    /// Reject a name without a number and vice versa
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.build_name.is_some() != self.build_number.is_some() {
            return Err(BridgeError::ConfigInvalid(
                "the build name and build number options cannot be provided separately".to_string(),
            ));
        }
        if self.module.is_some() && !self.is_collect_build_info() {
            return Err(BridgeError::ConfigInvalid(
                "the build module option requires build name and build number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref().filter(|p| !p.is_empty())
    }
}

/// Options extracted from a wrapped npm command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmOptions {
    pub threads: usize,
    pub detailed_summary: bool,
    pub xray_scan: bool,
    pub scan_output_format: ScanOutputFormat,
    /// Arguments left for the tool
    pub clean_args: Vec<String>,
    pub build_configuration: BuildConfiguration,
}

/// Remove a value flag (`--flag=v` or `--flag v`) and return its value
///
/// The last occurrence wins; every occurrence is removed.
pub fn take_value_flag(args: &mut Vec<String>, flag: &str) -> Result<Option<String>, BridgeError> {
    let prefix = format!("{flag}=");
    let mut value = None;
    let mut i = 0;
    while i < args.len() {
        if let Some(v) = args[i].strip_prefix(&prefix) {
            value = Some(v.to_string());
            args.remove(i);
        } else if args[i] == flag {
            if i + 1 >= args.len() {
                return Err(BridgeError::ConfigInvalid(format!(
                    "flag {flag} is provided with an empty value"
                )));
            }
            value = Some(args.remove(i + 1));
            args.remove(i);
        } else {
            i += 1;
        }
    }
    Ok(value)
}

/// Remove a boolean flag (`--flag`, `--flag=true`, `--flag=false`) and return its value
pub fn take_bool_flag(args: &mut Vec<String>, flag: &str) -> Result<bool, BridgeError> {
    let prefix = format!("{flag}=");
    let mut value = false;
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            value = true;
            args.remove(i);
        } else if let Some(v) = args[i].strip_prefix(&prefix) {
            value = v.parse::<bool>().map_err(|_| {
                BridgeError::ConfigInvalid(format!("can't parse {flag} value '{v}', expected true or false"))
            })?;
            args.remove(i);
        } else {
            i += 1;
        }
    }
    Ok(value)
}

/// Remove the build-info flags from `args`
pub fn extract_build_configuration(args: &mut Vec<String>) -> Result<BuildConfiguration, BridgeError> {
    let config = BuildConfiguration {
        build_name: take_value_flag(args, "--build-name")?,
        build_number: take_value_flag(args, "--build-number")?,
        project: take_value_flag(args, "--project")?,
        module: take_value_flag(args, "--module")?,
    };
    config.validate()?;
    Ok(config)
}

/// Split a wrapped npm command line into rtbridge options and tool arguments
pub fn extract_npm_options(args: &[String]) -> Result<NpmOptions, BridgeError> {
    let mut args = args.to_vec();

    let threads = match take_value_flag(&mut args, "--threads")? {
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(BridgeError::ConfigInvalid(format!(
                    "the --threads value must be a positive integer, got '{raw}'"
                )))
            }
        },
        None => DEFAULT_THREADS,
    };
    let detailed_summary = take_bool_flag(&mut args, "--detailed-summary")?;
    let xray_scan = take_bool_flag(&mut args, "--scan")?;
    let scan_output_format = take_value_flag(&mut args, "--format")?
        .map(|f| f.parse())
        .transpose()?
        .unwrap_or_default();
    let build_configuration = extract_build_configuration(&mut args)?;

    Ok(NpmOptions {
        threads,
        detailed_summary,
        xray_scan,
        scan_output_format,
        clean_args: args,
        build_configuration,
    })
}
