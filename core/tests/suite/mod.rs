// One module per subsystem.
mod cluster_resolution;
mod config_providers;
mod credential_lifecycle;
mod model_calls;
