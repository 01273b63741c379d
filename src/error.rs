use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClustermError {
    #[error("unexpected number of arguments, expected: {expected} got: {got}")]
    UnexpectedArgCount { expected: String, got: usize },

    #[error("failed to parse ip address {0:?}")]
    InvalidIpAddr(String),

    #[error("invalid host group {0:?}, expected one of: service-master, service-worker")]
    InvalidHostGroup(String),

    #[error("extra vars must be a JSON object: {0}")]
    InvalidExtraVars(String),

    #[error("node with name or address {0:?} doesn't exists")]
    NodeNotExists(String),

    #[error("the configuration info for node {0:?} doesn't exist")]
    NodeConfigNotExists(String),

    #[error("the inventory info for node {0:?} doesn't exist")]
    NodeInventoryNotExists(String),

    #[error(
        "one or more nodes are not in discovered state, please check their network reachability. Non-discovered nodes: {0:?}"
    )]
    NodesNotDiscovered(Vec<String>),

    #[error("a discovered node with address {0:?} already exists")]
    NodeAlreadyExists(String),

    #[error("node {0:?} is already commissioned, decommission it before commissioning again")]
    NodeAlreadyCommissioned(String),

    #[error("node {0:?} is not commissioned")]
    NodeNotCommissioned(String),

    #[error(
        "decommissioning the specified node(s) will leave only worker nodes in the cluster, make sure all worker nodes are decommissioned before last master node."
    )]
    WorkersWithoutMaster,

    #[error("there is already an active job, please try in sometime. Job: {0}")]
    ActiveJob(String),

    #[error("there is no active job")]
    NoActiveJob,

    #[error("no job has run yet")]
    NoLastJob,

    #[error("failed to update {node}'s state in inventory, Error: {reason}")]
    TransitionFailed { node: String, reason: String },

    #[error("asset {0:?} not found in inventory")]
    AssetNotFound(String),

    #[error("job was cancelled")]
    JobCancelled,

    #[error("workflow failed: {0}")]
    Workflow(String),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClustermError>;
