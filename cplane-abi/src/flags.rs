use bitflags::bitflags;

bitflags! {
    /// Common interface flags, settable by the control plane.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug, serde::Serialize, serde::Deserialize)]
    pub struct IfaceFlags: u16 {
        const UP       = 1 << 0;
        const PROMISC  = 1 << 1;
        const ALLMULTI = 1 << 2;
    }
}

bitflags! {
    /// Observed interface state. `RUNNING` mirrors link-up as reported by
    /// the DDF, not the administrative `UP` flag.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug, serde::Serialize, serde::Deserialize)]
    pub struct IfaceState: u16 {
        const RUNNING = 1 << 0;
    }
}

bitflags! {
    /// Which attributes a `reconfig` call carries. Stable wire values: a
    /// client composes this mask to say which fields of the request are
    /// meaningful, everything else is left untouched.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug, serde::Serialize, serde::Deserialize)]
    pub struct ReconfigMask: u32 {
        // Common
        const SET_FLAGS  = 1 << 0;
        const SET_MTU    = 1 << 1;
        const SET_VRF    = 1 << 2;
        // Port
        const SET_N_RXQS = 1 << 3;
        const SET_N_TXQS = 1 << 4;
        const SET_Q_SIZE = 1 << 5;
        const SET_MAC    = 1 << 6;
        // VLAN
        const SET_PARENT = 1 << 7;
        const SET_VLAN   = 1 << 8;
    }
}

impl ReconfigMask {
    /// "All attributes valid; this is initial configuration." Reconfig
    /// callbacks tell initial config from a delta by comparing against this
    /// exact mask rather than just checking individual bits.
    pub const SET_ALL: ReconfigMask = ReconfigMask::all();

    #[inline]
    pub fn is_initial(self) -> bool {
        self == Self::SET_ALL
    }
}

bitflags! {
    /// Next-hop status flags.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug, serde::Serialize, serde::Deserialize)]
    pub struct NhFlags: u16 {
        const STATIC    = 1 << 0;
        const REACHABLE = 1 << 1;
        /// Address owned locally (e.g. one of the router's own interface
        /// addresses) — never removable via `nh_del`.
        const LOCAL     = 1 << 2;
        /// Link-scope next hop installed by the system itself.
        const LINK      = 1 << 3;
    }
}
