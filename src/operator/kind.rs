// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt;

bitflags! {
    /// Flags describing what an operator is for. Admission caps are
    /// applied per flag.
    pub struct OpKind: u32 {
        const LEADER     = 1;
        const REGION     = 1 << 1;
        const REPLICA    = 1 << 2;
        const MERGE      = 1 << 3;
        const SPLIT      = 1 << 4;
        const HOT_REGION = 1 << 5;
        const ADMIN      = 1 << 6;
    }
}

impl OpKind {
    pub fn flag_name(flag: OpKind) -> &'static str {
        match flag {
            OpKind::LEADER => "leader",
            OpKind::REGION => "region",
            OpKind::REPLICA => "replica",
            OpKind::MERGE => "merge",
            OpKind::SPLIT => "split",
            OpKind::HOT_REGION => "hot-region",
            OpKind::ADMIN => "admin",
            _ => "unknown",
        }
    }

    pub fn flags() -> [OpKind; 7] {
        [
            OpKind::LEADER,
            OpKind::REGION,
            OpKind::REPLICA,
            OpKind::MERGE,
            OpKind::SPLIT,
            OpKind::HOT_REGION,
            OpKind::ADMIN,
        ]
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for flag in OpKind::flags() {
            if self.contains(flag) {
                if !first {
                    write!(f, ",")?;
                }
                write!(f, "{}", OpKind::flag_name(flag))?;
                first = false;
            }
        }
        if first {
            write!(f, "none")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_values() {
        assert_eq!(OpKind::LEADER.bits(), 1);
        assert_eq!(OpKind::REGION.bits(), 2);
        assert_eq!(OpKind::REPLICA.bits(), 4);
        assert_eq!(OpKind::MERGE.bits(), 8);
        assert_eq!(OpKind::SPLIT.bits(), 16);
        assert_eq!(OpKind::HOT_REGION.bits(), 32);
        assert_eq!(OpKind::ADMIN.bits(), 64);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", OpKind::LEADER | OpKind::REGION), "leader,region");
        assert_eq!(format!("{}", OpKind::empty()), "none");
    }
}
