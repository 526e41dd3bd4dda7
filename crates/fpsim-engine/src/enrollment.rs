//! Scripted enrollment sequences.

use std::time::Duration;

use fpsim_core::{Error, Result};

/// A scripted enrollment read from `next_enrollment`.
///
/// The text form is `id:d1,d2,...:result`: the enrollment id, one capture
/// delay in milliseconds per step, and whether the enrollment succeeds
/// (`true` or `false`). The result may be omitted and defaults to success.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use fpsim_engine::EnrollmentScript;
///
/// let script: EnrollmentScript = "4:100,200:true".parse().unwrap();
/// assert_eq!(script.enrollment_id, 4);
/// assert_eq!(script.steps, vec![Duration::from_millis(100), Duration::from_millis(200)]);
/// assert!(script.succeeds);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentScript {
    pub enrollment_id: i32,
    pub steps: Vec<Duration>,
    pub succeeds: bool,
}

impl EnrollmentScript {
    /// A single-step successful enrollment.
    pub fn single(enrollment_id: i32, delay: Duration) -> Self {
        Self {
            enrollment_id,
            steps: vec![delay],
            succeeds: true,
        }
    }
}

impl std::str::FromStr for EnrollmentScript {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: String| Error::invalid_config("next_enrollment", message);
        let parts: Vec<&str> = s.trim().split(':').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(invalid(format!("expected id:delays[:result], got {s:?}")));
        }

        let enrollment_id = parts[0]
            .trim()
            .parse::<i32>()
            .map_err(|e| invalid(format!("bad id {:?}: {e}", parts[0])))?;

        let steps = parts[1]
            .split(',')
            .map(|step| {
                step.trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|e| invalid(format!("bad delay {step:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let succeeds = match parts.get(2).map(|r| r.trim()) {
            None | Some("true") => true,
            Some("false") => false,
            Some(other) => return Err(invalid(format!("bad result {other:?}"))),
        };

        Ok(Self {
            enrollment_id,
            steps,
            succeeds,
        })
    }
}
