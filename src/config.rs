use std::{
    env, fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

pub const DEFAULT_MODEL_ID: &str = "Inferless/gpt-oss-20b";
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub model_id: String,
    pub revision: Option<String>,
    pub model_artifact: String,
    pub device: DevicePreference,
    pub precision: Precision,
    pub download_timeout: Duration,
}

/// Where the engine places the model. `Auto` picks the first CUDA device when
/// one is visible and falls back to the CPU otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePreference {
    Auto,
    Cpu,
    Cuda(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Auto,
    Float32,
    Float16,
    BFloat16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = lookup("SERVER_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".into())
            .parse()
            .unwrap_or_else(|_| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));

        let model_id = lookup("MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());
        let revision = lookup("MODEL_REVISION");
        // No default: hub repositories have no conventional TorchScript name.
        let model_artifact = lookup("MODEL_ARTIFACT")
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "MODEL_ARTIFACT must name the TorchScript export inside {model_id:?}"
                )
            })?;

        let device = DevicePreference::parse(&lookup("DEVICE").unwrap_or_else(|| "auto".into()))?;
        let precision =
            Precision::parse(&lookup("TORCH_DTYPE").unwrap_or_else(|| "auto".into()))?;

        let download_timeout = lookup("HF_HUB_DOWNLOAD_TIMEOUT")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT);

        Ok(Self {
            listen_addr,
            model_id,
            revision,
            model_artifact,
            device,
            precision,
            download_timeout,
        })
    }
}

impl DevicePreference {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let lower = raw.trim().to_lowercase();
        if lower == "auto" {
            Ok(Self::Auto)
        } else if lower == "cpu" {
            Ok(Self::Cpu)
        } else if let Some(rest) = lower.strip_prefix("cuda") {
            let idx = match rest.strip_prefix(':') {
                Some(idx) => idx
                    .parse::<usize>()
                    .map_err(|_| anyhow::anyhow!("invalid cuda device index in {raw:?}"))?,
                None if rest.is_empty() => 0,
                None => anyhow::bail!("unrecognized device {raw:?}"),
            };
            Ok(Self::Cuda(idx))
        } else {
            anyhow::bail!("unrecognized device {raw:?}, expected auto, cpu or cuda[:N]")
        }
    }
}

impl Precision {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "float32" | "fp32" | "f32" => Ok(Self::Float32),
            "float16" | "fp16" | "f16" | "half" => Ok(Self::Float16),
            "bfloat16" | "bf16" => Ok(Self::BFloat16),
            other => anyhow::bail!("unrecognized dtype {other:?}"),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Precision::Auto => "auto",
            Precision::Float32 => "float32",
            Precision::Float16 => "float16",
            Precision::BFloat16 => "bfloat16",
        };
        f.write_str(name)
    }
}
