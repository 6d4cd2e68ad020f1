//! Identidad de navegador/dispositivo que cada worker manda en sus headers.
//!
//! Se genera una vez por worker y no cambia mientras el worker vive.
//! Todo sale del `Rng` que se pasa, así que con una semilla fija el
//! resultado es reproducible.

use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

const CPU_MODELS: &[&str] = &[
    "Intel(R) Core(TM) i5-6200U CPU @ 2.30GHz",
    "Intel(R) Core(TM) i7-8550U CPU @ 1.80GHz",
    "Intel(R) Core(TM) i5-10210U CPU @ 1.60GHz",
    "Intel(R) Core(TM) i7-9750H CPU @ 2.60GHz",
    "Intel(R) Core(TM) i5-1135G7 CPU @ 2.40GHz",
    "Intel(R) Core(TM) i7-1165G7 CPU @ 2.80GHz",
    "AMD Ryzen 5 3600 6-Core Processor",
    "AMD Ryzen 7 5800X 8-Core Processor",
    "AMD Ryzen 5 5600X 6-Core Processor",
    "Intel(R) Core(TM) i9-10900K CPU @ 3.70GHz",
    "Intel(R) Core(TM) i5-11400F CPU @ 2.60GHz",
    "AMD Ryzen 9 5900X 12-Core Processor",
];

const APPLE_CPU_MODELS: &[&str] = &["Apple M1", "Apple M2"];

const CPU_COUNTS: &[u8] = &[2, 4, 6, 8, 12, 16];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Windows,
    Linux,
    Macos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuArch {
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "arm64")]
    Arm64,
}

impl CpuArch {
    pub fn as_str(&self) -> &'static str {
        match self {
            CpuArch::X86_64 => "x86_64",
            CpuArch::Arm64 => "arm64",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub os: OsFamily,
    pub user_agent: String,
    /// Ej: "Windows 10.0.19044", "Ubuntu 22.04", "macOS 13.0.0"
    pub device_os: String,
    pub device_name: String,
    pub device_model: String,
    pub cpu_model: String,
    pub cpu_arch: CpuArch,
    pub cpu_count: u8,
    pub chrome_version: u32,
    pub extension_version: String,
}

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, options: &[&'a str]) -> &'a str {
    options.choose(rng).copied().unwrap_or_default()
}

impl Fingerprint {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, extension_version: &str) -> Self {
        let os = match rng.gen_range(0..3) {
            0 => OsFamily::Windows,
            1 => OsFamily::Linux,
            _ => OsFamily::Macos,
        };
        let chrome_version: u32 = rng.gen_range(120..=143);

        let (user_agent, device_os, device_name, cpu_arch) = match os {
            OsFamily::Windows => {
                let win_ver = pick(rng, &["10.0.0", "11.0.0", "10.0.19044", "11.0.22000"]);
                (
                    format!(
                        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/{chrome_version}.0.0.0 Safari/537.36"
                    ),
                    format!("Windows {win_ver}"),
                    pick(rng, &["windows pc", "desktop", "workstation", "pc"]),
                    CpuArch::X86_64,
                )
            }
            OsFamily::Linux => (
                format!(
                    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/{chrome_version}.0.0.0 Safari/537.36"
                ),
                pick(
                    rng,
                    &["Ubuntu 22.04", "Ubuntu 20.04", "Debian 11", "Fedora 38", "Linux"],
                )
                .to_string(),
                pick(rng, &["linux pc", "desktop", "workstation"]),
                CpuArch::X86_64,
            ),
            OsFamily::Macos => {
                let mac_ver = pick(rng, &["10_15_7", "11_6_0", "12_5_0", "13_0_0", "14_1_0"]);
                let webkit = pick(rng, &["605.1.15", "604.1.38", "616.1.27"]);
                let arch = if rng.gen_bool(0.5) {
                    CpuArch::X86_64
                } else {
                    CpuArch::Arm64
                };
                (
                    format!(
                        "Mozilla/5.0 (Macintosh; Intel Mac OS X {mac_ver}) \
                         AppleWebKit/{webkit} Version/17.1 Safari/{webkit}"
                    ),
                    format!("macOS {}", mac_ver.replace('_', ".")),
                    pick(rng, &["macbook", "imac", "mac", "macbook pro"]),
                    arch,
                )
            }
        };

        // arm64 sólo existe en Mac y siempre con CPU de Apple
        let cpu_model = match cpu_arch {
            CpuArch::Arm64 => pick(rng, APPLE_CPU_MODELS),
            CpuArch::X86_64 => pick(rng, CPU_MODELS),
        };
        let cpu_count = CPU_COUNTS.choose(rng).copied().unwrap_or(4);

        Self {
            os,
            device_model: format!("PC {} - Chrome {chrome_version}", cpu_arch.as_str()),
            user_agent,
            device_os,
            device_name: device_name.to_string(),
            cpu_model: cpu_model.to_string(),
            cpu_arch,
            cpu_count,
            chrome_version,
            extension_version: extension_version.to_string(),
        }
    }

    /// Headers fijos que acompañan cada request del worker.
    pub fn headers(&self, token: &str, device_id: &str) -> Vec<(&'static str, String)> {
        vec![
            ("User-Agent", self.user_agent.clone()),
            ("Accept", "application/json".to_string()),
            ("Content-Type", "application/json".to_string()),
            ("Authorization", format!("Bearer {token}")),
            ("x-app-version", self.extension_version.clone()),
            ("x-platform", "chrome".to_string()),
            ("x-extension-version", self.extension_version.clone()),
            ("x-browser", "chrome".to_string()),
            ("x-device-id", device_id.to_string()),
            ("x-device-model", self.device_model.clone()),
            ("x-device-name", self.device_name.clone()),
            ("x-device-os", self.device_os.clone()),
            ("x-device-type", "extension".to_string()),
            ("x-user-language", "en-US".to_string()),
            ("x-user-agent", self.user_agent.clone()),
            ("x-cpu-model", self.cpu_model.clone()),
            ("x-cpu-architecture", self.cpu_arch.as_str().to_string()),
            ("x-cpu-processor-count", self.cpu_count.to_string()),
            ("x-s", "f".to_string()),
        ]
    }
}
