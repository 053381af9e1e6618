//! Default TOML config template with inline documentation comments.

pub(crate) fn default_config_toml() -> String {
    r##"# epoch-sync configuration
# Only override what you want to change -- missing fields use defaults.

[realtime]
# project_ref = ""                 # Supabase project reference
# endpoint = "ws://localhost:4000/socket/websocket"   # overrides project_ref
# api_key = ""
# access_token = ""
# heartbeat_interval_secs = 25     # 1-120
# reconnect_delay_secs = 1         # 1-60
# max_reconnect_delay_secs = 30    # >= reconnect_delay_secs, <= 600
# connect_timeout_secs = 15        # 1-120

[channels]
# broadcast_self = false
# broadcast_ack = true

[session]
# event_buffer = 256               # 16-65536
# diagnostics_capacity = 64        # 1-4096
"##
    .to_string()
}
