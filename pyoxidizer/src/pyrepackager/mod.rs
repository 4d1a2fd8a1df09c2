// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod bytecode;
pub mod config;
pub mod dist;
pub mod fsscan;
pub mod packaging_rule;
pub mod repackage;
pub mod resource;
pub mod state;
