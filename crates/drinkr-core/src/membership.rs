//! Membership rules shared by every storage backend.
//!
//! Backends call these inside the same transaction that applies the change,
//! so the checks and the write cannot be separated by a concurrent request.

use uuid::Uuid;

use crate::{
  Error, Result,
  group::{Membership, Role},
  user::UserId,
};

/// Look up `user_id` among `members`.
pub fn find<'a>(members: &'a [Membership], user_id: &UserId) -> Option<&'a Membership> {
  members.iter().find(|m| &m.user_id == user_id)
}

/// Fail with [`Error::Forbidden`] unless `actor` is an admin of the group.
pub fn require_admin(
  group_id: Uuid,
  members: &[Membership],
  actor: &UserId,
) -> Result<()> {
  match find(members, actor) {
    Some(m) if m.is_admin() => Ok(()),
    Some(_) => Err(Error::Forbidden(format!(
      "{actor} is not an admin of group {group_id}"
    ))),
    None => Err(Error::Forbidden(format!(
      "{actor} is not a member of group {group_id}"
    ))),
  }
}

/// Check that `user_id` may be removed from the group (by leaving or being
/// removed) and return their current membership.
///
/// A group with members must keep at least one admin. The last member of a
/// group may always leave, since an empty group needs no admin.
pub fn check_removal<'a>(
  group_id: Uuid,
  members: &'a [Membership],
  user_id: &UserId,
) -> Result<&'a Membership> {
  let target = find(members, user_id).ok_or_else(|| Error::MemberNotFound {
    group_id,
    user_id: user_id.clone(),
  })?;

  let admins = members.iter().filter(|m| m.role == Role::Admin).count();
  let remaining = members.len() - 1;
  if target.is_admin() && admins == 1 && remaining > 0 {
    return Err(Error::LastAdmin(group_id));
  }
  Ok(target)
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;

  fn member(user: &str, role: Role) -> Membership {
    Membership {
      group_id:     Uuid::nil(),
      user_id:      UserId::from(user),
      role,
      display_name: None,
      joined_at:    Utc::now(),
    }
  }

  #[test]
  fn last_admin_cannot_leave_while_members_remain() {
    let members = vec![member("a", Role::Admin), member("b", Role::Member)];
    let err = check_removal(Uuid::nil(), &members, &UserId::from("a")).unwrap_err();
    assert!(matches!(err, Error::LastAdmin(_)));
  }

  #[test]
  fn plain_member_can_leave() {
    let members = vec![member("a", Role::Admin), member("b", Role::Member)];
    let m = check_removal(Uuid::nil(), &members, &UserId::from("b")).unwrap();
    assert_eq!(m.user_id.as_str(), "b");
  }

  #[test]
  fn one_of_two_admins_can_leave() {
    let members = vec![
      member("a", Role::Admin),
      member("b", Role::Admin),
      member("c", Role::Member),
    ];
    assert!(check_removal(Uuid::nil(), &members, &UserId::from("a")).is_ok());
  }

  #[test]
  fn sole_member_can_leave() {
    let members = vec![member("a", Role::Admin)];
    assert!(check_removal(Uuid::nil(), &members, &UserId::from("a")).is_ok());
  }

  #[test]
  fn unknown_member_is_not_found() {
    let members = vec![member("a", Role::Admin)];
    let err = check_removal(Uuid::nil(), &members, &UserId::from("z")).unwrap_err();
    assert!(matches!(err, Error::MemberNotFound { .. }));
  }

  #[test]
  fn require_admin_rejects_members_and_strangers() {
    let members = vec![member("a", Role::Admin), member("b", Role::Member)];
    assert!(require_admin(Uuid::nil(), &members, &UserId::from("a")).is_ok());
    assert!(matches!(
      require_admin(Uuid::nil(), &members, &UserId::from("b")),
      Err(Error::Forbidden(_))
    ));
    assert!(matches!(
      require_admin(Uuid::nil(), &members, &UserId::from("z")),
      Err(Error::Forbidden(_))
    ));
  }
}
