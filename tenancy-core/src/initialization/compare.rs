use tenancy_model::{LifecycleState, Resource, ResourceBody};

/// The part of a body that a definition declares. Identity fields,
/// back-references and state owned by resource managers are blanked.
fn declared(body: &ResourceBody) -> ResourceBody {
    let mut body = body.normalized();
    match &mut body {
        ResourceBody::Tenant(tenant) => {
            tenant.current_state = LifecycleState::Unspecified;
            tenant.watcher_os_manager = false;
        }
        ResourceBody::Instance(instance) => instance.current_state = LifecycleState::Unspecified,
        ResourceBody::Host(host) => host.current_state = LifecycleState::Unspecified,
        _ => {}
    }
    body
}

/// Structural equality used to decide whether a definition is already
/// provisioned. Envelope identity and timestamps never take part.
pub fn resources_equivalent(a: &Resource, b: &Resource) -> bool {
    a.kind() == b.kind() && declared(&a.body) == declared(&b.body)
}
