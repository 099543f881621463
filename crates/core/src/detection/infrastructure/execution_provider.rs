use std::fmt;
use std::str::FromStr;

/// Hardware-acceleration preference for the inference engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Accelerator {
    /// Use the platform accelerator when available, falling back to CPU.
    #[default]
    Gpu,
    Cpu,
}

impl FromStr for Accelerator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpu" => Ok(Accelerator::Gpu),
            "cpu" => Ok(Accelerator::Cpu),
            other => Err(format!("Accelerator must be 'gpu' or 'cpu', got '{other}'")),
        }
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accelerator::Gpu => write!(f, "gpu"),
            Accelerator::Cpu => write!(f, "cpu"),
        }
    }
}

/// Return the ONNX execution providers for the requested acceleration.
///
/// An empty list means the default CPU provider. ONNX Runtime falls back to
/// CPU on its own if a listed provider is unavailable.
pub fn execution_providers_for(
    accelerator: Accelerator,
) -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    if accelerator == Accelerator::Cpu {
        return vec![];
    }
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("gpu", Accelerator::Gpu)]
    #[case("GPU", Accelerator::Gpu)]
    #[case("cpu", Accelerator::Cpu)]
    fn test_parse_accelerator(#[case] input: &str, #[case] expected: Accelerator) {
        assert_eq!(input.parse::<Accelerator>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_accelerator_errors() {
        assert!("tpu".parse::<Accelerator>().is_err());
    }

    #[test]
    fn test_cpu_uses_default_provider() {
        assert!(execution_providers_for(Accelerator::Cpu).is_empty());
    }
}
