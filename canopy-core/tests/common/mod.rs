/*
    Shared setup for membership integration tests

    Builds group trees through the public service API only.
*/

#![allow(dead_code)]

use canopy_core::config::MembershipConfig;
use canopy_core::core_membership::{
    Event, EventSubject, Group, Membership, MembershipService, MembershipSqlStore,
    MembershipStore, NewMembership, ThreadId, ThreadRef, UserId,
};

pub fn service() -> MembershipService {
    service_with(MembershipConfig::default())
}

pub fn service_with(config: MembershipConfig) -> MembershipService {
    let store = MembershipSqlStore::memory().expect("in-memory store");
    MembershipService::new(store, config)
}

pub fn user(name: &str) -> UserId {
    UserId::new(name)
}

pub fn root(service: &MembershipService, name: &str) -> Group {
    service.create_group(name, None).expect("create root group")
}

pub fn child(service: &MembershipService, parent: &Group, name: &str) -> Group {
    service
        .create_group(name, Some(&parent.id))
        .expect("create subgroup")
}

pub fn discussion_guests(service: &MembershipService, host: &Group) -> Group {
    service
        .create_guest_group(&host.id, ThreadRef::discussion(ThreadId::generate()))
        .expect("create discussion guest group")
}

pub fn poll_guests(service: &MembershipService, host: &Group) -> Group {
    service
        .create_guest_group(&host.id, ThreadRef::poll(ThreadId::generate()))
        .expect("create poll guest group")
}

pub fn member(service: &MembershipService, group: &Group, name: &str) -> Membership {
    service
        .add_member(&group.id, &user(name), None)
        .expect("add member")
}

/// Pending membership with no inviter, as left by a join request
pub fn join_request(service: &MembershipService, group: &Group, name: &str) -> Membership {
    let mut attrs = NewMembership::accepted(group.id, user(name), None);
    attrs.accepted_at = None;
    service
        .store()
        .transaction(|txn| txn.create(attrs))
        .expect("create join request")
}

pub fn events_about(service: &MembershipService, subject: EventSubject) -> Vec<Event> {
    service
        .store()
        .read(|txn| txn.events_for(&subject))
        .expect("read events")
}

pub fn is_member(service: &MembershipService, group: &Group, name: &str) -> bool {
    service
        .members_of(&group.id)
        .expect("members_of")
        .contains(&user(name))
}
