// SPDX-License-Identifier: GPL-3.0-only
//! Sources of hardware notifications

pub mod acpid;
