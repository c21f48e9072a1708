use thiserror::Error;

pub type Result<T> = std::result::Result<T, MappingError>;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("can't open mapping file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("mapping file couldn't be parsed: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("mapping file must be a list of rules, found {0}")]
    NotAList(String),

    #[error(
        "source has {source_width} fields but the target table has {target_width} columns; \
         enable defaulting of non-mapped columns or supply a mapping file"
    )]
    InsufficientSource {
        source_width: usize,
        target_width: usize,
    },

    #[error("no mapping found for target column {column}: {name}")]
    Unmapped { column: usize, name: String },
}
