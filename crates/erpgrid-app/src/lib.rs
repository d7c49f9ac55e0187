// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod adapter;
pub mod controller;
pub mod editors;
pub mod forms;
pub mod ids;
pub mod model;
pub mod notify;
pub mod reconciler;
pub mod render;
pub mod resources;
pub mod state;

pub use adapter::*;
pub use controller::*;
pub use editors::*;
pub use forms::*;
pub use ids::*;
pub use model::*;
pub use notify::*;
pub use reconciler::*;
pub use render::*;
pub use resources::*;
pub use state::*;
