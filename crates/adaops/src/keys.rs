//! Key generation and hashing. Meant for the air-gapped host.

use crate::cardano::{check_file_exists, path_arg, CardanoCli, CliError};
use crate::exec::CommandRunner;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPair {
    pub vkey: PathBuf,
    pub skey: PathBuf,
}

/// Pool cold keys plus the operational certificate issue counter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColdKeys {
    pub vkey: PathBuf,
    pub skey: PathBuf,
    pub counter: PathBuf,
}

fn in_dir(cwd: Option<&Path>, name: String) -> PathBuf {
    match cwd {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

impl<R: CommandRunner> CardanoCli<R> {
    /// `address key-gen` writing `<prefix>.vkey` / `<prefix>.skey`.
    pub async fn address_key_gen(&self, prefix: &str, cwd: Option<&Path>) -> Result<KeyPair, CliError> {
        let vkey = format!("{prefix}.vkey");
        let skey = format!("{prefix}.skey");
        self.run_checked(
            cwd,
            [
                "address",
                "key-gen",
                "--verification-key-file",
                &vkey,
                "--signing-key-file",
                &skey,
            ],
            "Was not able to generate address key pair",
        )
        .await?;
        Ok(KeyPair {
            vkey: in_dir(cwd, vkey),
            skey: in_dir(cwd, skey),
        })
    }

    pub async fn node_cold_keys(&self, prefix: &str, cwd: Option<&Path>) -> Result<ColdKeys, CliError> {
        let vkey = format!("{prefix}.vkey");
        let skey = format!("{prefix}.skey");
        let counter = format!("{prefix}.counter");
        self.run_checked(
            cwd,
            [
                "node",
                "key-gen",
                "--cold-verification-key-file",
                &vkey,
                "--cold-signing-key-file",
                &skey,
                "--operational-certificate-issue-counter-file",
                &counter,
            ],
            "Was not able to generate node's cold key pair",
        )
        .await?;
        Ok(ColdKeys {
            vkey: in_dir(cwd, vkey),
            skey: in_dir(cwd, skey),
            counter: in_dir(cwd, counter),
        })
    }

    pub async fn node_vrf_keys(&self, prefix: &str, cwd: Option<&Path>) -> Result<KeyPair, CliError> {
        self.node_key_pair("key-gen-VRF", prefix, cwd, "Was not able to generate VRF key pair")
            .await
    }

    pub async fn node_kes_keys(&self, prefix: &str, cwd: Option<&Path>) -> Result<KeyPair, CliError> {
        self.node_key_pair("key-gen-KES", prefix, cwd, "Was not able to generate KES key pair")
            .await
    }

    async fn node_key_pair(
        &self,
        command: &str,
        prefix: &str,
        cwd: Option<&Path>,
        msg: &str,
    ) -> Result<KeyPair, CliError> {
        let vkey = format!("{prefix}.vkey");
        let skey = format!("{prefix}.skey");
        self.run_checked(
            cwd,
            [
                "node",
                command,
                "--verification-key-file",
                &vkey,
                "--signing-key-file",
                &skey,
            ],
            msg,
        )
        .await?;
        Ok(KeyPair {
            vkey: in_dir(cwd, vkey),
            skey: in_dir(cwd, skey),
        })
    }

    /// Hash of a payment verification key.
    pub async fn key_hash(&self, vkey: &Path) -> Result<String, CliError> {
        let vkey = check_file_exists(vkey)?;
        let out = self
            .run_checked(
                None,
                [
                    "address",
                    "key-hash",
                    "--payment-verification-key-file",
                    &path_arg(&vkey),
                ],
                &format!("Was not able to get {} key hash", vkey.display()),
            )
            .await?;
        Ok(out.trim().to_string())
    }

    /// Policy id of a native script.
    pub async fn policy_id(&self, script_file: &Path) -> Result<String, CliError> {
        let script = check_file_exists(script_file)?;
        let out = self
            .run_checked(
                None,
                ["transaction", "policyid", "--script-file", &path_arg(&script)],
                "Was not able to calculate policy id",
            )
            .await?;
        Ok(out.trim().to_string())
    }
}
