//! Network and mount policy definitions for sandbox containers.

/// Network access mode for sandbox containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NetworkMode {
    /// No network interfaces besides loopback.
    #[default]
    None,
    /// Default bridge network. Never used for untrusted submissions.
    Bridge,
}

impl NetworkMode {
    /// Value passed to Docker's `HostConfig.network_mode`.
    pub fn as_docker(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bridge => "bridge",
        }
    }

    /// Whether the container gets any network interface at all.
    pub fn is_disabled(self) -> bool {
        self == Self::None
    }
}

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_docker())
    }
}

/// Access mode of the workspace bind mount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MountMode {
    /// Program directory is mounted read-only.
    #[default]
    ReadOnly,
    /// Program directory is mounted read-write.
    ReadWrite,
}

impl MountMode {
    /// Suffix used in a Docker bind specification.
    pub fn as_bind_suffix(self) -> &'static str {
        match self {
            Self::ReadOnly => "ro",
            Self::ReadWrite => "rw",
        }
    }
}

impl std::fmt::Display for MountMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_bind_suffix())
    }
}
