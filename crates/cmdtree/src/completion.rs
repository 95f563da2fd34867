//! How a program was asked to run, decided once from the environment.

use crate::error::ModeError;
use cmdtree_shape::{SHAPE_ENV_VAR, decode_versions};

/// Index of the word under the cursor, exported by the bash completion hook.
pub const COMP_CWORD_ENV_VAR: &str = "COMP_CWORD";
/// When set, print a bash completion function for the program and exit.
pub const INSTALL_COMPLETION_ENV_VAR: &str = "CMDTREE_OUTPUT_INSTALLATION_BASH";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DispatchMode {
    #[default]
    Normal,
    /// `argv` is the shell's word list and `cursor` indexes the partial word.
    Completing { cursor: usize },
    /// A parent program asked for our shape in one of `versions`.
    ExportingShape { versions: Vec<u32> },
    InstallingCompletion,
}

impl DispatchMode {
    pub fn from_env() -> Result<Self, ModeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ModeError> {
        if lookup(INSTALL_COMPLETION_ENV_VAR).is_some() {
            return Ok(Self::InstallingCompletion);
        }
        if let Some(raw) = lookup(SHAPE_ENV_VAR) {
            let versions = decode_versions(&raw).map_err(ModeError::BadVersions)?;
            return Ok(Self::ExportingShape { versions });
        }
        if let Some(raw) = lookup(COMP_CWORD_ENV_VAR) {
            let cursor = raw
                .trim()
                .parse()
                .map_err(|_| ModeError::BadCursor(raw.clone()))?;
            return Ok(Self::Completing { cursor });
        }
        Ok(Self::Normal)
    }

    pub fn is_completing(&self) -> bool {
        matches!(self, Self::Completing { .. })
    }
}

/// Split the shell's word list into the complete words after the program
/// name and the partial word under the cursor.
pub(crate) fn split_for_completion(argv: &[String], cursor: usize) -> (Vec<String>, String) {
    let end = cursor.clamp(1, argv.len().max(1));
    let words = argv.get(1..end).map(<[String]>::to_vec).unwrap_or_default();
    let partial = if cursor == 0 {
        String::new()
    } else {
        argv.get(cursor).cloned().unwrap_or_default()
    };
    (words, partial)
}

/// A bash completion function for `name`, run as `invocation`.
///
/// Source the output from `.bashrc` to enable completion.
pub fn bash_installer(invocation: &str, name: &str) -> String {
    let ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!(
        r#"function _cmdtree_complete_{ident} {{
  export COMP_CWORD
  COMP_WORDS[0]={invocation}
  if type readarray > /dev/null 2>&1
  then readarray -t COMPREPLY < <("${{COMP_WORDS[@]}}")
  else IFS=$'\n' read -d '' -r -a COMPREPLY < <("${{COMP_WORDS[@]}}")
  fi
}}
complete -F _cmdtree_complete_{ident} {name}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn mode(vars: &[(&str, &str)]) -> Result<DispatchMode, ModeError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DispatchMode::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn environment_selects_mode_by_precedence() {
        assert_eq!(mode(&[]).unwrap(), DispatchMode::Normal);
        assert_eq!(
            mode(&[("COMP_CWORD", "2")]).unwrap(),
            DispatchMode::Completing { cursor: 2 }
        );
        assert_eq!(
            mode(&[("COMP_CWORD", "2"), (SHAPE_ENV_VAR, "[1,2]")]).unwrap(),
            DispatchMode::ExportingShape { versions: vec![1, 2] }
        );
        assert_eq!(
            mode(&[(SHAPE_ENV_VAR, "[1]"), (INSTALL_COMPLETION_ENV_VAR, "")]).unwrap(),
            DispatchMode::InstallingCompletion
        );
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(matches!(
            mode(&[("COMP_CWORD", "x")]),
            Err(ModeError::BadCursor(_))
        ));
        assert!(matches!(
            mode(&[(SHAPE_ENV_VAR, "1,2")]),
            Err(ModeError::BadVersions(_))
        ));
    }

    #[test]
    fn cursor_splits_words_and_partial() {
        let argv: Vec<String> = ["prog", "start", "-na", "ignored"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            split_for_completion(&argv, 2),
            (vec!["start".to_string()], "-na".to_string())
        );
        assert_eq!(
            split_for_completion(&argv[..2], 2),
            (vec!["start".to_string()], String::new())
        );
        assert_eq!(split_for_completion(&argv, 1), (vec![], "start".to_string()));
    }

    #[test]
    fn installer_registers_a_completion_function() {
        let script = bash_installer("/usr/bin/my-tool", "my-tool");
        assert!(script.contains("function _cmdtree_complete_my_tool {"), "{script}");
        assert!(script.contains("COMP_WORDS[0]=/usr/bin/my-tool"), "{script}");
        assert!(script.ends_with("complete -F _cmdtree_complete_my_tool my-tool\n"), "{script}");
    }
}
