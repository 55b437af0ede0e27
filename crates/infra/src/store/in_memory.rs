//! In-memory store for tests/dev.
//!
//! All state lives behind one `RwLock`; every mutating call takes the write
//! lock once, validates, then applies its effects, so a failed call leaves
//! no partial writes behind.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use coursedesk_auth::{Session, SessionToken};
use coursedesk_core::{
    Attendance, Attendee, Course, CourseChanges, CourseId, CourseLink, CourseLinkChanges, Entity,
    LinkId, Location, LocationId, Lookup, LookupId, LookupKind, NewCourse, NewCourseLink,
    NewLocation, NewUser, Registration, User, UserChanges, UserId, UserType,
};

use super::{
    AttendanceStore, CourseStore, ReferenceStore, SessionStore, StoreError, StoreResult, UserStore,
};

/// Auto-incrementing table keyed by the entity id.
#[derive(Debug)]
struct Table<T: Entity> {
    rows: BTreeMap<T::Id, T>,
    next_id: i64,
}

impl<T> Table<T>
where
    T: Entity + Clone,
    T::Id: From<i64> + Into<i64>,
{
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn get(&self, id: T::Id) -> Option<&T> {
        self.rows.get(&id)
    }

    fn contains(&self, id: T::Id) -> bool {
        self.rows.contains_key(&id)
    }

    fn require(&self, id: T::Id) -> StoreResult<&T> {
        self.rows.get(&id).ok_or(StoreError::NotFound(T::NAME))
    }

    fn require_mut(&mut self, id: T::Id) -> StoreResult<&mut T> {
        self.rows.get_mut(&id).ok_or(StoreError::NotFound(T::NAME))
    }

    fn insert_with(&mut self, build: impl FnOnce(T::Id) -> T) -> T {
        let id = T::Id::from(self.next_id);
        self.next_id += 1;
        let row = build(id);
        self.rows.insert(id, row.clone());
        row
    }

    /// Insert a row with a caller-chosen id (seed data).
    fn insert(&mut self, row: T) {
        let raw: i64 = row.id().into();
        self.next_id = self.next_id.max(raw + 1);
        self.rows.insert(row.id(), row);
    }

    fn remove(&mut self, id: T::Id) -> Option<T> {
        self.rows.remove(&id)
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }
}

#[derive(Debug)]
struct State {
    users: Table<User>,
    courses: Table<Course>,
    links: Table<CourseLink>,
    locations: Table<Location>,
    lookups: HashMap<LookupKind, Table<Lookup>>,
    attendance: BTreeMap<(CourseId, UserId), Attendance>,
    presenting: BTreeSet<(CourseId, UserId)>,
    sessions: HashMap<SessionToken, Session>,
}

impl State {
    fn new() -> Self {
        let mut lookups = HashMap::new();
        for kind in [
            LookupKind::CourseType,
            LookupKind::CourseLinkType,
            LookupKind::UserType,
        ] {
            lookups.insert(kind, Table::new());
        }
        let mut state = Self {
            users: Table::new(),
            courses: Table::new(),
            links: Table::new(),
            locations: Table::new(),
            lookups,
            attendance: BTreeMap::new(),
            presenting: BTreeSet::new(),
            sessions: HashMap::new(),
        };
        let usertypes = state.lookups_mut(LookupKind::UserType);
        for t in UserType::ALL {
            usertypes.insert(Lookup {
                id: LookupId::new(i64::from(t.id())),
                name: t.name().to_string(),
            });
        }
        state
    }

    fn lookups(&self, kind: LookupKind) -> Option<&Table<Lookup>> {
        self.lookups.get(&kind)
    }

    fn lookups_mut(&mut self, kind: LookupKind) -> &mut Table<Lookup> {
        self.lookups.entry(kind).or_insert_with(Table::new)
    }

    fn lookup_exists(&self, kind: LookupKind, id: LookupId) -> bool {
        self.lookups(kind).is_some_and(|t| t.contains(id))
    }

    fn registrations_of(&self, course_id: CourseId) -> u32 {
        let n = self
            .attendance
            .range((course_id, UserId::new(i64::MIN))..=(course_id, UserId::new(i64::MAX)))
            .count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    /// A course row with its derived fields filled in.
    fn course_view(&self, course: &Course) -> Course {
        Course {
            registrations: self.registrations_of(course.id),
            ..course.clone()
        }
    }

    fn check_location(&self, location_id: Option<LocationId>) -> StoreResult<()> {
        match location_id {
            Some(id) if !self.locations.contains(id) => {
                Err(StoreError::Validation(format!("unknown location {id}")))
            }
            _ => Ok(()),
        }
    }

    fn check_lookup(&self, kind: LookupKind, id: Option<LookupId>) -> StoreResult<()> {
        match id {
            Some(id) if !self.lookup_exists(kind, id) => Err(StoreError::Validation(format!(
                "unknown {} {id}",
                kind.entity_name()
            ))),
            _ => Ok(()),
        }
    }

    fn check_email_free(&self, email: &str, except: Option<UserId>) -> StoreResult<()> {
        let taken = self
            .users
            .values()
            .any(|u| u.email == email && Some(u.id) != except);
        if taken {
            return Err(StoreError::Conflict(format!("email '{email}' is already registered")));
        }
        Ok(())
    }

    fn links_of(&self, course_id: CourseId) -> Vec<CourseLink> {
        self.links
            .values()
            .filter(|l| l.course_id == course_id)
            .cloned()
            .collect()
    }

    fn presenters_of(&self, course_id: CourseId) -> Vec<User> {
        self.presenting
            .iter()
            .filter(|(c, _)| *c == course_id)
            .filter_map(|(_, u)| self.users.get(*u).cloned())
            .collect()
    }

    fn attendees_of(&self, course_id: CourseId) -> Vec<Attendee> {
        self.attendance
            .values()
            .filter(|a| a.course_id == course_id)
            .filter_map(|a| {
                self.users.get(a.user_id).map(|user| Attendee {
                    user: user.clone(),
                    attended: a.attended,
                })
            })
            .collect()
    }
}

/// In-memory [`Store`](super::Store) implementation.
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::new()),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn list_users(&self, usertype: Option<UserType>) -> StoreResult<Vec<User>> {
        let state = self.read()?;
        Ok(state
            .users
            .values()
            .filter(|u| usertype.is_none_or(|t| u.usertype == t))
            .cloned()
            .collect())
    }

    async fn users_at_location(&self, location_id: LocationId) -> StoreResult<Vec<User>> {
        let state = self.read()?;
        state.locations.require(location_id)?;
        Ok(state
            .users
            .values()
            .filter(|u| u.location_id == Some(location_id))
            .cloned()
            .collect())
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.trim().to_lowercase();
        let state = self.read()?;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut state = self.write()?;
        state.check_email_free(&user.email, None)?;
        state.check_location(user.location_id)?;
        Ok(state.users.insert_with(|id| User {
            id,
            name: user.name,
            email: user.email,
            usertype: user.usertype,
            location_id: user.location_id,
        }))
    }

    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<User> {
        let mut state = self.write()?;
        state.users.require(id)?;
        if let Some(email) = changes.normalized_email() {
            state.check_email_free(&email, Some(id))?;
        }
        let user = state.users.require_mut(id)?;
        user.apply(&changes)?;
        Ok(user.clone())
    }

    async fn set_user_location(
        &self,
        id: UserId,
        location_id: Option<LocationId>,
    ) -> StoreResult<User> {
        let mut state = self.write()?;
        state.check_location(location_id)?;
        let user = state.users.require_mut(id)?;
        user.location_id = location_id;
        Ok(user.clone())
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<()> {
        let mut state = self.write()?;
        state.users.require(id)?;
        state.attendance.retain(|(_, u), _| *u != id);
        state.presenting.retain(|(_, u)| *u != id);
        state.sessions.retain(|_, s| s.user_id != id);
        state.users.remove(id);
        Ok(())
    }
}

#[async_trait]
impl CourseStore for InMemoryStore {
    async fn list_courses(&self) -> StoreResult<Vec<Course>> {
        let state = self.read()?;
        Ok(state.courses.values().map(|c| state.course_view(c)).collect())
    }

    async fn courses_at_location(&self, location_id: LocationId) -> StoreResult<Vec<Course>> {
        let state = self.read()?;
        state.locations.require(location_id)?;
        Ok(state
            .courses
            .values()
            .filter(|c| c.location_id == Some(location_id))
            .map(|c| state.course_view(c))
            .collect())
    }

    async fn get_course(&self, id: CourseId) -> StoreResult<Option<Course>> {
        let state = self.read()?;
        Ok(state.courses.get(id).map(|c| state.course_view(c)))
    }

    async fn most_popular_course(&self) -> StoreResult<Option<Course>> {
        let state = self.read()?;
        let mut best: Option<Course> = None;
        for course in state.courses.values().map(|c| state.course_view(c)) {
            if best
                .as_ref()
                .is_none_or(|b| course.registrations > b.registrations)
            {
                best = Some(course);
            }
        }
        Ok(best)
    }

    async fn create_course(&self, course: NewCourse) -> StoreResult<Course> {
        let mut state = self.write()?;
        state.check_lookup(LookupKind::CourseType, course.coursetype_id)?;
        state.check_location(course.location_id)?;
        Ok(state.courses.insert_with(|id| Course {
            id,
            title: course.title,
            description: course.description,
            starts: course.starts,
            ends: course.ends,
            coursetype_id: course.coursetype_id,
            location_id: course.location_id,
            registrations: 0,
        }))
    }

    async fn update_course(&self, id: CourseId, changes: CourseChanges) -> StoreResult<Course> {
        let mut state = self.write()?;
        state.courses.require(id)?;
        state.check_lookup(LookupKind::CourseType, changes.coursetype_id)?;
        state.check_location(changes.location_id)?;
        let course = state.courses.require_mut(id)?;
        course.apply(&changes)?;
        let course = course.clone();
        Ok(state.course_view(&course))
    }

    async fn delete_course(&self, id: CourseId) -> StoreResult<()> {
        let mut state = self.write()?;
        state.courses.require(id)?;
        let links: Vec<LinkId> = state.links_of(id).iter().map(|l| l.id).collect();
        for link in links {
            state.links.remove(link);
        }
        state.attendance.retain(|(c, _), _| *c != id);
        state.presenting.retain(|(c, _)| *c != id);
        state.courses.remove(id);
        Ok(())
    }

    async fn list_links(&self, course_id: CourseId) -> StoreResult<Vec<CourseLink>> {
        let state = self.read()?;
        state.courses.require(course_id)?;
        Ok(state.links_of(course_id))
    }

    async fn get_link(
        &self,
        course_id: CourseId,
        link_id: LinkId,
    ) -> StoreResult<Option<CourseLink>> {
        let state = self.read()?;
        Ok(state
            .links
            .get(link_id)
            .filter(|l| l.course_id == course_id)
            .cloned())
    }

    async fn create_link(&self, course_id: CourseId, link: NewCourseLink) -> StoreResult<CourseLink> {
        let mut state = self.write()?;
        state.courses.require(course_id)?;
        state.check_lookup(LookupKind::CourseLinkType, link.linktype_id)?;
        Ok(state.links.insert_with(|id| CourseLink {
            id,
            course_id,
            title: link.title,
            url: link.url,
            linktype_id: link.linktype_id,
        }))
    }

    async fn update_link(
        &self,
        course_id: CourseId,
        link_id: LinkId,
        changes: CourseLinkChanges,
    ) -> StoreResult<CourseLink> {
        let mut state = self.write()?;
        state.check_lookup(LookupKind::CourseLinkType, changes.linktype_id)?;
        let link = state
            .links
            .require_mut(link_id)
            .and_then(|l| {
                if l.course_id == course_id {
                    Ok(l)
                } else {
                    Err(StoreError::NotFound(CourseLink::NAME))
                }
            })?;
        link.apply(&changes)?;
        Ok(link.clone())
    }

    async fn delete_link(
        &self,
        course_id: CourseId,
        link_id: LinkId,
    ) -> StoreResult<Vec<CourseLink>> {
        let mut state = self.write()?;
        if state.links.get(link_id).is_none_or(|l| l.course_id != course_id) {
            return Err(StoreError::NotFound(CourseLink::NAME));
        }
        state.links.remove(link_id);
        Ok(state.links_of(course_id))
    }

    async fn list_presenters(&self, course_id: CourseId) -> StoreResult<Vec<User>> {
        let state = self.read()?;
        state.courses.require(course_id)?;
        Ok(state.presenters_of(course_id))
    }

    async fn is_presenting(&self, course_id: CourseId, user_id: UserId) -> StoreResult<bool> {
        Ok(self.read()?.presenting.contains(&(course_id, user_id)))
    }

    async fn add_presenter(&self, course_id: CourseId, user_id: UserId) -> StoreResult<Vec<User>> {
        let mut state = self.write()?;
        state.courses.require(course_id)?;
        state.users.require(user_id)?;
        state.presenting.insert((course_id, user_id));
        Ok(state.presenters_of(course_id))
    }

    async fn remove_presenter(
        &self,
        course_id: CourseId,
        user_id: UserId,
    ) -> StoreResult<Vec<User>> {
        let mut state = self.write()?;
        state.courses.require(course_id)?;
        if !state.presenting.remove(&(course_id, user_id)) {
            return Err(StoreError::NotFound("presenter"));
        }
        Ok(state.presenters_of(course_id))
    }

    async fn presenting(&self, user_id: UserId) -> StoreResult<Vec<Course>> {
        let state = self.read()?;
        Ok(state
            .presenting
            .iter()
            .filter(|(_, u)| *u == user_id)
            .filter_map(|(c, _)| state.courses.get(*c))
            .map(|c| state.course_view(c))
            .collect())
    }
}

#[async_trait]
impl AttendanceStore for InMemoryStore {
    async fn list_attendees(&self, course_id: CourseId) -> StoreResult<Vec<Attendee>> {
        let state = self.read()?;
        state.courses.require(course_id)?;
        Ok(state.attendees_of(course_id))
    }

    async fn register(&self, course_id: CourseId, user_id: UserId) -> StoreResult<Attendance> {
        let mut state = self.write()?;
        state.courses.require(course_id)?;
        state.users.require(user_id)?;
        if state.attendance.contains_key(&(course_id, user_id)) {
            return Err(StoreError::Conflict(format!(
                "user {user_id} is already registered for course {course_id}"
            )));
        }
        let row = Attendance::registered(course_id, user_id);
        state.attendance.insert((course_id, user_id), row.clone());
        Ok(row)
    }

    async fn confirm(&self, course_id: CourseId, user_id: UserId) -> StoreResult<Attendance> {
        let mut state = self.write()?;
        state.courses.require(course_id)?;
        let row = state
            .attendance
            .get_mut(&(course_id, user_id))
            .ok_or(StoreError::NotFound("registration"))?;
        row.confirm();
        Ok(row.clone())
    }

    async fn confirm_many(
        &self,
        course_id: CourseId,
        user_ids: &[UserId],
    ) -> StoreResult<Vec<Attendee>> {
        let mut state = self.write()?;
        state.courses.require(course_id)?;
        if user_ids
            .iter()
            .any(|u| !state.attendance.contains_key(&(course_id, *u)))
        {
            return Err(StoreError::NotFound("registration"));
        }
        for user_id in user_ids {
            if let Some(row) = state.attendance.get_mut(&(course_id, *user_id)) {
                row.confirm();
            }
        }
        Ok(state.attendees_of(course_id))
    }

    async fn unregister(&self, course_id: CourseId, user_id: UserId) -> StoreResult<Vec<Attendee>> {
        let mut state = self.write()?;
        state.courses.require(course_id)?;
        if state.attendance.remove(&(course_id, user_id)).is_none() {
            return Err(StoreError::NotFound("registration"));
        }
        Ok(state.attendees_of(course_id))
    }

    async fn registrations(
        &self,
        user_id: UserId,
        confirmed_only: bool,
    ) -> StoreResult<Vec<Registration>> {
        let state = self.read()?;
        Ok(state
            .attendance
            .values()
            .filter(|a| a.user_id == user_id && (a.attended || !confirmed_only))
            .filter_map(|a| {
                state.courses.get(a.course_id).map(|c| Registration {
                    course: state.course_view(c),
                    attended: a.attended,
                })
            })
            .collect())
    }
}

#[async_trait]
impl ReferenceStore for InMemoryStore {
    async fn list_lookups(&self, kind: LookupKind) -> StoreResult<Vec<Lookup>> {
        let state = self.read()?;
        Ok(state
            .lookups(kind)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_lookup(&self, kind: LookupKind, id: LookupId) -> StoreResult<Option<Lookup>> {
        let state = self.read()?;
        Ok(state.lookups(kind).and_then(|t| t.get(id)).cloned())
    }

    async fn create_lookup(&self, kind: LookupKind, name: String) -> StoreResult<Lookup> {
        if kind == LookupKind::UserType {
            return Err(StoreError::Validation("user types are fixed".to_string()));
        }
        let name = Lookup::validate_name(&name)?;
        let mut state = self.write()?;
        Ok(state.lookups_mut(kind).insert_with(|id| Lookup { id, name }))
    }

    async fn rename_lookup(
        &self,
        kind: LookupKind,
        id: LookupId,
        name: String,
    ) -> StoreResult<Lookup> {
        let name = Lookup::validate_name(&name)?;
        let mut state = self.write()?;
        let row = state
            .lookups_mut(kind)
            .require_mut(id)
            .map_err(|_| StoreError::NotFound(kind.entity_name()))?;
        row.name = name;
        Ok(row.clone())
    }

    async fn delete_lookup(&self, kind: LookupKind, id: LookupId) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.lookup_exists(kind, id) {
            return Err(StoreError::NotFound(kind.entity_name()));
        }
        let in_use = match kind {
            LookupKind::CourseType => state.courses.values().any(|c| c.coursetype_id == Some(id)),
            LookupKind::CourseLinkType => state.links.values().any(|l| l.linktype_id == Some(id)),
            LookupKind::UserType => true,
        };
        if in_use {
            return Err(StoreError::Conflict(format!(
                "{} {id} is still in use",
                kind.entity_name()
            )));
        }
        state.lookups_mut(kind).remove(id);
        Ok(())
    }

    async fn list_locations(&self) -> StoreResult<Vec<Location>> {
        Ok(self.read()?.locations.values().cloned().collect())
    }

    async fn get_location(&self, id: LocationId) -> StoreResult<Option<Location>> {
        Ok(self.read()?.locations.get(id).cloned())
    }

    async fn create_location(&self, location: NewLocation) -> StoreResult<Location> {
        let mut state = self.write()?;
        Ok(state.locations.insert_with(|id| Location {
            id,
            name: location.name,
        }))
    }

    async fn rename_location(&self, id: LocationId, location: NewLocation) -> StoreResult<Location> {
        let mut state = self.write()?;
        let row = state.locations.require_mut(id)?;
        row.name = location.name;
        Ok(row.clone())
    }

    async fn delete_location(&self, id: LocationId) -> StoreResult<()> {
        let mut state = self.write()?;
        state.locations.require(id)?;
        let in_use = state.users.values().any(|u| u.location_id == Some(id))
            || state.courses.values().any(|c| c.location_id == Some(id));
        if in_use {
            return Err(StoreError::Conflict(format!("location {id} is still in use")));
        }
        state.locations.remove(id);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create_session(&self, session: Session) -> StoreResult<()> {
        let mut state = self.write()?;
        state.users.require(session.user_id)?;
        state.sessions.insert(session.token, session);
        Ok(())
    }

    async fn get_session(&self, token: SessionToken) -> StoreResult<Option<Session>> {
        Ok(self.read()?.sessions.get(&token).cloned())
    }

    async fn delete_session(&self, token: SessionToken) -> StoreResult<()> {
        self.write()?.sessions.remove(&token);
        Ok(())
    }
}
