// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Holds Rust struct definitions for various ASN.1 primitives. */

pub mod common;
pub mod rfc3161;
pub mod rfc3280;
pub mod rfc3281;
pub mod rfc4210;
pub mod rfc4519;
pub mod rfc5280;
pub mod rfc5480;
pub mod rfc5652;
pub mod rfc5915;
pub mod rfc5958;
