//! Interned atoms shared across the manager.

x11rb::atom_manager! {
    /// All atoms are interned in one round trip at startup.
    pub Atoms:
    AtomsCookie {
        WM_STATE,
        WM_PROTOCOLS,
        WM_DELETE_WINDOW,
        WM_CHANGE_STATE,
        SOLOWM_COMMAND,
        UTF8_STRING,
        _NET_SUPPORTED,
        _NET_CLIENT_LIST,
        _NET_ACTIVE_WINDOW,
        _NET_SUPPORTING_WM_CHECK,
        _NET_WM_NAME,
        _NET_WM_STATE,
        _NET_WM_STATE_ABOVE,
    }
}
