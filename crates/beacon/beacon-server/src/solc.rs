use std::sync::Arc;

use alloy_json_abi::JsonAbi;
use bollard::{
    Docker,
    container::{
        Config as ContainerConfig,
        CreateContainerOptions,
        LogOutput,
        LogsOptions,
        RemoveContainerOptions,
        StartContainerOptions,
        WaitContainerOptions,
    },
    image::{
        CreateImageOptions,
        ListImagesOptions,
    },
    service::HostConfig,
};
use futures::{
    StreamExt,
    TryStreamExt,
};
use tempfile::TempDir;
use uuid::Uuid;

/// Result of compiling the contract source: the constructor shape comes from
/// the ABI, the creation code is what gets deployed.
#[derive(Debug, Clone)]
pub struct CompiledContract {
    pub name: String,
    pub abi: JsonAbi,
    pub bytecode: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum CompilationError {
    #[error("solc failed: {0}")]
    CompilationFailed(String),

    #[error("contract '{0}' not found in compiler output")]
    ContractNotFound(String),

    #[error("multiple deployable contracts in compiler output ({0}); set --contract-name")]
    AmbiguousContract(String),

    #[error("compiler output carries no bytecode for '{0}'")]
    MissingBytecode(String),

    #[error("malformed compiler output: {0}")]
    InvalidOutput(String),

    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("container wait stream ended unexpectedly")]
    ContainerWaitEnded,
}

/// Drives pinned-version `ethereum/solc` images through Docker. One
/// container per compile, removed on every exit path.
pub struct Solc {
    docker: Arc<Docker>,
    version: String,
}

impl Solc {
    pub fn new(docker: Arc<Docker>, version: String) -> Self {
        #[cfg(target_arch = "aarch64")]
        tracing::debug!(
            target: "solc",
            "Running on arm64, solc containers will use amd64 emulation"
        );

        Self { docker, version }
    }

    fn image(&self) -> String {
        format!("ethereum/solc:{}", self.version)
    }

    /// Compile `source` at the pinned solc version and pick the target
    /// contract from the combined output.
    pub async fn compile(
        &self,
        source: &str,
        contract_name: Option<&str>,
    ) -> Result<CompiledContract, CompilationError> {
        metrics::counter!("beacon_compilations_total", "compiler_version" => self.version.clone())
            .increment(1);

        self.ensure_image().await?;

        // The source lives in a scratch dir bind-mounted into the container.
        let scratch = TempDir::new()?;
        let file_name = format!("{}.sol", Uuid::new_v4());
        std::fs::write(scratch.path().join(&file_name), source)?;
        let host_dir = scratch
            .path()
            .to_str()
            .ok_or_else(|| CompilationError::Io(std::io::Error::other("non-utf8 temp path")))?;

        let cmd = vec![
            "--combined-json".to_string(),
            "abi,bin".to_string(),
            "--metadata-hash".to_string(),
            "none".to_string(),
            "--base-path".to_string(),
            "/src".to_string(),
            format!("/src/{file_name}"),
        ];
        let binds = vec![format!("{host_dir}:/src")];

        let combined = self.run_solc(cmd, binds).await?;
        select_contract(&combined, contract_name)
    }

    /// Make sure the pinned compiler image exists locally, pulling it once
    /// if absent.
    async fn ensure_image(&self) -> Result<(), CompilationError> {
        let image = self.image();
        let images = self.docker.list_images(None::<ListImagesOptions<String>>).await?;
        if images.iter().any(|img| img.repo_tags.contains(&image)) {
            tracing::debug!(target: "solc", image, "Compiler image present locally");
            return Ok(());
        }

        tracing::info!(target: "solc", image, "Pulling compiler image");
        self.docker
            .create_image(
                Some(CreateImageOptions {
                    from_image: image.clone(),
                    // solc images are published for amd64 only
                    platform: "linux/amd64".to_string(),
                    ..Default::default()
                }),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await?;
        Ok(())
    }

    /// Run one solc container to completion and return its stdout.
    async fn run_solc(
        &self,
        cmd: Vec<String>,
        binds: Vec<String>,
    ) -> Result<String, CompilationError> {
        let name = format!("solc_{}", Uuid::new_v4());
        let config = ContainerConfig {
            image: Some(self.image()),
            cmd: Some(cmd),
            host_config: Some(HostConfig {
                binds: Some(binds),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = Some(CreateContainerOptions {
            name: name.clone(),
            platform: Some("linux/amd64".to_string()),
        });

        let id = self.docker.create_container(options, config).await?.id;
        let result = self.drive_container(&id).await;

        // One-shot container; remove it whatever happened above.
        if let Err(err) = self
            .docker
            .remove_container(
                &id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            tracing::warn!(target: "solc", container = %name, ?err, "Failed to remove compiler container");
        }

        result
    }

    async fn drive_container(&self, id: &str) -> Result<String, CompilationError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;

        let wait = self
            .docker
            .wait_container(id, Some(WaitContainerOptions { condition: "not-running" }))
            .next()
            .await
            .ok_or(CompilationError::ContainerWaitEnded)?;

        match wait {
            Ok(exit) if exit.status_code == 0 => self.logs(id, true, false).await,
            Ok(_) | Err(bollard::errors::Error::DockerContainerWaitError { .. }) => {
                let diagnostics = self.logs(id, true, true).await?;
                tracing::error!(target: "solc", "Compilation failed: {diagnostics}");
                Err(CompilationError::CompilationFailed(diagnostics))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn logs(
        &self,
        id: &str,
        stdout: bool,
        stderr: bool,
    ) -> Result<String, CompilationError> {
        let chunks: Vec<_> = self
            .docker
            .logs(
                id,
                Some(LogsOptions::<String> {
                    stdout,
                    stderr,
                    ..Default::default()
                }),
            )
            .try_collect()
            .await?;

        Ok(chunks
            .iter()
            .filter_map(|log| match log {
                LogOutput::StdOut { message } | LogOutput::StdErr { message } => {
                    Some(String::from_utf8_lossy(message))
                }
                _ => None,
            })
            .collect())
    }
}

/// Pick the target contract out of solc's `--combined-json abi,bin` output.
/// Keys are `<path>:<ContractName>`; without an explicit name the unique
/// contract carrying creation bytecode wins.
fn select_contract(
    combined: &str,
    wanted: Option<&str>,
) -> Result<CompiledContract, CompilationError> {
    let output: serde_json::Value = serde_json::from_str(combined)?;
    let contracts = output["contracts"]
        .as_object()
        .ok_or_else(|| CompilationError::InvalidOutput("missing 'contracts' object".into()))?;

    let mut candidates = Vec::new();
    for (key, entry) in contracts {
        let name = key.rsplit(':').next().unwrap_or(key.as_str());
        let has_bytecode = !entry["bin"].as_str().unwrap_or_default().is_empty();
        match wanted {
            Some(target) if name == target => candidates.push((name.to_string(), entry)),
            Some(_) => {}
            None if has_bytecode => candidates.push((name.to_string(), entry)),
            None => {}
        }
    }

    if candidates.len() > 1 {
        let names = candidates
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(CompilationError::AmbiguousContract(names));
    }
    let (name, entry) = match candidates.pop() {
        Some(found) => found,
        None => {
            return match wanted {
                Some(target) => Err(CompilationError::ContractNotFound(target.to_string())),
                None => Err(CompilationError::InvalidOutput(
                    "no deployable contract in compiler output".into(),
                )),
            };
        }
    };

    let bin = entry["bin"].as_str().unwrap_or_default();
    if bin.is_empty() {
        return Err(CompilationError::MissingBytecode(name));
    }
    let bytecode = hex::decode(bin.trim_start_matches("0x"))?;

    // Older solc releases emit the ABI as an embedded JSON string.
    let abi: JsonAbi = match &entry["abi"] {
        serde_json::Value::String(raw) => serde_json::from_str(raw)?,
        other => serde_json::from_value(other.clone())?,
    };

    Ok(CompiledContract { name, abi, bytecode })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: &str = r#"{
        "contracts": {
            "/src/in.sol:Token": {
                "abi": [{"type":"constructor","stateMutability":"nonpayable","inputs":[{"name":"feed","type":"address","internalType":"address"}]}],
                "bin": "6080604052"
            }
        },
        "version": "0.8.21+commit.d9974bed.Linux.g++"
    }"#;

    const FLATTENED: &str = r#"{
        "contracts": {
            "/src/in.sol:Context": {"abi": [], "bin": ""},
            "/src/in.sol:SafeMath": {"abi": [], "bin": "60566050"},
            "/src/in.sol:Token": {"abi": [], "bin": "6080604052"}
        },
        "version": "0.8.21+commit.d9974bed.Linux.g++"
    }"#;

    #[test]
    fn selects_the_only_deployable_contract() {
        let compiled = select_contract(SINGLE, None).unwrap();
        assert_eq!(compiled.name, "Token");
        assert_eq!(compiled.bytecode, hex::decode("6080604052").unwrap());
        let constructor = compiled.abi.constructor.as_ref().unwrap();
        assert_eq!(constructor.inputs.len(), 1);
        assert_eq!(constructor.inputs[0].ty, "address");
    }

    #[test]
    fn selects_by_name_from_flattened_output() {
        let compiled = select_contract(FLATTENED, Some("Token")).unwrap();
        assert_eq!(compiled.name, "Token");
        assert_eq!(compiled.bytecode, hex::decode("6080604052").unwrap());
    }

    #[test]
    fn ambiguous_output_requires_a_name() {
        let err = select_contract(FLATTENED, None).unwrap_err();
        assert!(matches!(err, CompilationError::AmbiguousContract(_)));
    }

    #[test]
    fn unknown_name_is_reported() {
        let err = select_contract(FLATTENED, Some("Missing")).unwrap_err();
        assert!(matches!(err, CompilationError::ContractNotFound(name) if name == "Missing"));
    }

    #[test]
    fn named_contract_without_bytecode_is_rejected() {
        let err = select_contract(FLATTENED, Some("Context")).unwrap_err();
        assert!(matches!(err, CompilationError::MissingBytecode(name) if name == "Context"));
    }

    #[test]
    fn abi_embedded_as_string_still_parses() {
        let combined = r#"{
            "contracts": {
                "/src/in.sol:Token": {
                    "abi": "[{\"type\":\"constructor\",\"stateMutability\":\"nonpayable\",\"inputs\":[]}]",
                    "bin": "60"
                }
            }
        }"#;
        let compiled = select_contract(combined, None).unwrap();
        assert!(compiled.abi.constructor.is_some());
    }

    #[test]
    fn garbage_output_is_invalid() {
        assert!(matches!(
            select_contract("{}", None).unwrap_err(),
            CompilationError::InvalidOutput(_)
        ));
        assert!(matches!(
            select_contract("not json", None).unwrap_err(),
            CompilationError::Json(_)
        ));
    }
}
