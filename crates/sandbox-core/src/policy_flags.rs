use bitflags::bitflags;

bitflags! {
    /// Per-node and per-cone policy bits carried by a manifest record.
    ///
    /// A record stores two independent masks — `node_policy` (applies only
    /// when the path search terminates exactly at this node) and
    /// `cone_policy` (applies to this node and, unless overridden, to every
    /// descendant) — both typed as `PolicyFlags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PolicyFlags: u32 {
        const ALLOW_READ                        = 1 << 0;
        const ALLOW_READ_IF_NONEXISTENT         = 1 << 1;
        const ALLOW_WRITE                       = 1 << 2;
        const ALLOW_SYMLINK_CREATION            = 1 << 3;
        const ALLOW_CREATE_DIRECTORY            = 1 << 4;
        const REPORT_ACCESS                     = 1 << 5;
        const REPORT_ACCESS_IF_EXISTENT         = 1 << 6;
        const REPORT_ACCESS_IF_NONEXISTENT      = 1 << 7;
        const REPORT_DIRECTORY_ENUMERATION      = 1 << 8;
        const OVERRIDE_TIMESTAMPS               = 1 << 9;
        const ENABLE_FULL_REPARSE_POINT_PARSING = 1 << 10;
        const TREAT_DIRECTORY_SYMLINK_AS_DIRECTORY = 1 << 11;
        const INDICATE_UNTRACKED                = 1 << 12;
    }
}

impl PolicyFlags {
    pub fn allows_read(self) -> bool {
        self.contains(Self::ALLOW_READ)
    }

    pub fn allows_write(self) -> bool {
        self.contains(Self::ALLOW_WRITE)
    }

    pub fn wants_report(self) -> bool {
        self.intersects(
            Self::REPORT_ACCESS
                | Self::REPORT_ACCESS_IF_EXISTENT
                | Self::REPORT_ACCESS_IF_NONEXISTENT,
        )
    }
}
