//! Domain model: profiles, explicit update operations, coordinator state

pub mod normalize;
mod ops;
mod profile;
mod state;

pub use ops::{
    AddOps, AliasPatch, BindsetKeyPatch, BindsetPatch, DeleteOps, KeyNameList, ModifyOps, ProfileProperties,
    ProfileUpdates,
};
pub use profile::{
    Alias, Bindset, BindsetSelector, Environment, KeyMap, MetadataEntry, PRIMARY_BINDSET, Profile, VirtualProfile,
    build_virtual_profile, derive_profile_id,
};
pub use state::{AppState, StateMetadata, StateSnapshot};
