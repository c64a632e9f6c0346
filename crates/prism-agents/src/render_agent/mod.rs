// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Acts as the **[A]gent** of the frame pipeline.
//!
//! The agent decides *when* the lanes run and keeps their state across the
//! lifetime of a GPU context; the lanes decide *how* a frame, a light pass or
//! a pick is executed.

mod agent;
mod capture;
mod guard;

pub use agent::RenderAgent;
pub use capture::CapturedImage;
pub use guard::{ReentrancyGuard, ReentrancyScope};
