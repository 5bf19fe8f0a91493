// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

//! Placement rules: declarative constraints on replica count, role and
//! store labels for a key range, and the fitting of a region's peers
//! onto them.

mod fit;
mod rule;

pub use self::fit::{fit_region, RegionFit, RuleFit};
pub use self::rule::{
    match_label_constraints, LabelConstraint, LabelConstraintOp, Rule, RuleManager, RuleRole,
};
