//! Error taxonomy shared by the loaders, the shader pipeline and startup.

use std::{fmt, path::PathBuf};

use thiserror::Error;

/// Malformed or inconsistent mesh/material text.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}:{line}: {message}")]
    Malformed {
        file: String,
        line: usize,
        message: String,
    },

    #[error("{file}:{line}: {kind} index {index} out of range (pool holds {len})")]
    IndexOutOfRange {
        file: String,
        line: usize,
        kind: &'static str,
        index: i64,
        len: usize,
    },

    #[error("{file}:{line}: {message}")]
    Inconsistent {
        file: String,
        line: usize,
        message: String,
    },

    #[error("{file}:{line}: material '{name}' was never declared")]
    UnknownMaterial {
        file: String,
        line: usize,
        name: String,
    },
}

/// Pipeline stage a shader source is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("{stage} shader rejected:\n{diagnostic}")]
    Compile {
        stage: ShaderStage,
        diagnostic: String,
    },

    #[error("program link failed: {diagnostic}")]
    Link { diagnostic: String },

    #[error("required shader binding '{name}' not found")]
    BindingNotFound { name: String },

    #[error("unknown shader or program handle {0}")]
    UnknownHandle(u32),
}

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("failed to decode image {}: {message}", .path.display())]
    Decode { path: PathBuf, message: String },

    #[error(
        "image {} is {width}x{height}; supported sizes are 1..={max} per side",
        .path.display()
    )]
    Unsupported {
        path: PathBuf,
        width: u32,
        height: u32,
        max: u32,
    },

    #[error("failed to upload texture {}: {message}", .path.display())]
    Upload { path: PathBuf, message: String },
}

/// One failed startup step.
#[derive(Debug, Error)]
pub enum SetupFailure {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Texture(#[from] TextureError),

    #[error("mesh has {vertices} vertices, more than one draw call can address")]
    MeshTooLarge { vertices: usize },
}

/// Every failure collected while preparing the scene.
#[derive(Debug, Error)]
#[error("startup failed with {} error(s):{}", .failures.len(), list_failures(.failures))]
pub struct StartupError {
    pub failures: Vec<SetupFailure>,
}

fn list_failures(failures: &[SetupFailure]) -> String {
    failures.iter().map(|f| format!("\n  - {f}")).collect()
}
