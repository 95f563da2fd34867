//! Asking a delegated program for its shape.

use crate::error::DispatchError;
use cmdtree_shape::{
    ExecShape, SHAPE_ENV_VAR, SUPPORTED_VERSIONS, Shape, ShapeError, Versioned, encode_versions,
};
use process_host::{Invocation, ProcessHost};

/// Run the delegate in shape export mode and read the shape it prints.
///
/// The child must exit successfully and print one envelope in a version we
/// offered; the result is upgraded to the latest format.
pub fn query_shape(host: &dyn ProcessHost, exec: &ExecShape) -> Result<Shape, DispatchError> {
    let program = exec.resolved_path();
    tracing::debug!(program = %program.display(), "querying delegate shape");

    let invocation =
        Invocation::new(&program).env(SHAPE_ENV_VAR, encode_versions(&SUPPORTED_VERSIONS));
    let captured = host.capture_stdout(&invocation).map_err(DispatchError::Host)?;
    let failure = |reason: String| DispatchError::ShapeQuery {
        program: program.clone(),
        reason,
    };

    if !captured.success {
        return Err(failure(match captured.code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by a signal".to_string(),
        }));
    }
    let payload = String::from_utf8(captured.stdout)
        .map_err(|_| failure("output is not valid UTF-8".to_string()))?;
    let versioned = Versioned::from_json(payload.trim()).map_err(|err| match err {
        ShapeError::UnsupportedVersion(version) => {
            failure(format!("answered with unrequested format-version {version}"))
        }
        other => failure(other.to_string()),
    })?;
    Ok(versioned.upgrade())
}

#[cfg(test)]
mod tests {
    use super::*;
    use process_host::Captured;
    use std::path::PathBuf;

    /// Answers every capture with the same output.
    struct Canned(Captured);

    impl ProcessHost for Canned {
        fn capture_stdout(&self, _: &Invocation) -> anyhow::Result<Captured> {
            Ok(self.0.clone())
        }

        fn exec(&self, _: &Invocation) -> anyhow::Result<i32> {
            anyhow::bail!("delegates are never executed while querying shapes")
        }
    }

    fn answering(stdout: impl Into<Vec<u8>>) -> Canned {
        Canned(Captured {
            stdout: stdout.into(),
            success: true,
            code: Some(0),
        })
    }

    fn exec() -> ExecShape {
        ExecShape {
            summary: "remote".into(),
            readme: None,
            working_dir: PathBuf::from("/opt/tools"),
            path_to_exe: PathBuf::from("bin/remote"),
        }
    }

    fn reason(host: &Canned) -> String {
        match query_shape(host, &exec()) {
            Err(DispatchError::ShapeQuery { program, reason }) => {
                assert_eq!(program, PathBuf::from("/opt/tools/bin/remote"));
                reason
            }
            other => panic!("expected a shape query failure, got {other:?}"),
        }
    }

    #[test]
    fn accepts_any_offered_version() {
        let shape = Shape::Exec(exec());
        for version in SUPPORTED_VERSIONS {
            let json = shape.downgrade(version).unwrap().to_json().unwrap();
            assert_eq!(query_shape(&answering(json), &exec()).unwrap(), shape);
        }
    }

    #[test]
    fn output_that_is_not_json_is_rejected() {
        let reason = reason(&answering("Usage: remote [OPTIONS]\n"));
        assert!(reason.starts_with("malformed shape payload"), "{reason}");
    }

    #[test]
    fn output_that_is_not_utf8_is_rejected() {
        assert_eq!(
            reason(&answering(vec![0xff, 0xfe, b'{'])),
            "output is not valid UTF-8"
        );
    }

    #[test]
    fn versions_we_did_not_offer_are_rejected() {
        let reason = reason(&answering(r#"{"format-version":9,"shape":{}}"#));
        assert_eq!(reason, "answered with unrequested format-version 9");
    }

    #[test]
    fn failing_children_report_how_they_ended() {
        let killed = Canned(Captured {
            stdout: Vec::new(),
            success: false,
            code: None,
        });
        assert_eq!(reason(&killed), "terminated by a signal");
        let failed = Canned(Captured {
            stdout: Vec::new(),
            success: false,
            code: Some(4),
        });
        assert_eq!(reason(&failed), "exited with status 4");
    }
}
