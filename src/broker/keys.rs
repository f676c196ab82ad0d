//! Broker key/channel namespace (spec §6). Every key string is built here
//! exactly once so no call site hand-rolls a `format!` and drifts.

pub fn app_backends(appname: &str) -> String {
    format!("eru:app:{appname}:backends")
}

pub fn entrypoint_backends(appname: &str, entrypoint: &str) -> String {
    format!("eru:app:{appname}:entrypoint:{entrypoint}:backends")
}

pub fn agent_containers_meta(host: &str) -> String {
    format!("eru:agent:{host}:containers:meta")
}

pub fn agent_vlan_channel(host: &str) -> String {
    format!("eru:agent:{host}:vlan")
}

pub fn agent_route_channel(host: &str) -> String {
    format!("eru:agent:{host}:route")
}

pub fn agent_feedback_queue(task_id: &str) -> String {
    format!("eru:agent:{task_id}:feedback")
}

pub fn agent_container_flag(container_id: &str) -> String {
    format!("eru:agent:{container_id}:container:flag")
}

pub fn discovery_published() -> &'static str {
    "eru:discovery:published"
}

pub fn task_result(task_id: &str) -> String {
    format!("eru:task:{task_id}:result")
}

pub fn task_log(task_id: &str) -> String {
    format!("eru:task:{task_id}:log")
}

pub fn task_pub(task_id: &str) -> String {
    format!("eru:task:{task_id}:pub")
}

pub fn falcon_version_expression(version_id: i64) -> String {
    format!("eru:falcon:version:{version_id}:expression")
}

/// Persistent job queue a task-enqueuing caller (out of scope) writes to and
/// the worker pool `blpop`s from.
pub fn task_queue() -> &'static str {
    "eru:task:queue"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builders() {
        assert_eq!(app_backends("demo"), "eru:app:demo:backends");
        assert_eq!(
            entrypoint_backends("demo", "web"),
            "eru:app:demo:entrypoint:web:backends"
        );
        assert_eq!(agent_vlan_channel("h1"), "eru:agent:h1:vlan");
        assert_eq!(agent_feedback_queue("t1"), "eru:agent:t1:feedback");
        assert_eq!(task_result("t1"), "eru:task:t1:result");
        assert_eq!(falcon_version_expression(5), "eru:falcon:version:5:expression");
    }
}
