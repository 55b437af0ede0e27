//! Postgres-backed store.
//!
//! Every mutating call runs inside one transaction. Cascades are spelled out
//! as ordered deletes; the schema carries no `ON DELETE` actions.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError   | Scenario                                   |
//! |-----------------------|--------------|--------------------------------------------|
//! | `23505`               | `Conflict`   | duplicate email, duplicate registration    |
//! | `23503`               | `Validation` | body references an unknown row             |
//! | `23514`               | `Validation` | course ends before it starts               |
//! | other                 | `Backend`    | connection loss, pool closed, decode error |

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use async_trait::async_trait;

use coursedesk_auth::{Session, SessionToken};
use coursedesk_core::{
    Attendance, Attendee, Course, CourseChanges, CourseId, CourseLink, CourseLinkChanges, LinkId,
    Location, LocationId, Lookup, LookupId, LookupKind, NewCourse, NewCourseLink, NewLocation,
    NewUser, Registration, User, UserChanges, UserId, UserType,
};

use super::{
    AttendanceStore, CourseStore, ReferenceStore, SessionStore, StoreError, StoreResult, UserStore,
};

const SCHEMA: &str = include_str!("schema.sql");

const USER_COLUMNS: &str = "u.id, u.name, u.email, u.usertype_id, u.location_id";

const COURSE_COLUMNS: &str = "c.id, c.title, c.description, c.starts, c.ends, c.coursetype_id, \
     c.location_id, \
     (SELECT COUNT(*) FROM course_user_attended r WHERE r.course_id = c.id) AS registrations";

const LINK_COLUMNS: &str = "id, course_id, title, url, linktype_id";

/// Postgres-backed [`Store`](super::Store).
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `url`.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and seed the fixed user types.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn conn(&self) -> StoreResult<sqlx::pool::PoolConnection<sqlx::Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))
    }
}

async fn exists(
    conn: &mut PgConnection,
    table: &str,
    id: i64,
    entity: &'static str,
) -> StoreResult<()> {
    let sql = format!("SELECT 1 FROM {table} WHERE id = $1");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("exists", e))?;
    match row {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound(entity)),
    }
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    let usertype: i32 = row.try_get("usertype_id").map_err(decode)?;
    Ok(User {
        id: UserId::new(row.try_get("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        usertype: UserType::try_from(usertype)?,
        location_id: row
            .try_get::<Option<i64>, _>("location_id")
            .map_err(decode)?
            .map(LocationId::new),
    })
}

fn course_from_row(row: &PgRow) -> StoreResult<Course> {
    let registrations: i64 = row.try_get("registrations").map_err(decode)?;
    Ok(Course {
        id: CourseId::new(row.try_get("id").map_err(decode)?),
        title: row.try_get("title").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        starts: row.try_get::<DateTime<Utc>, _>("starts").map_err(decode)?,
        ends: row.try_get::<DateTime<Utc>, _>("ends").map_err(decode)?,
        coursetype_id: row
            .try_get::<Option<i64>, _>("coursetype_id")
            .map_err(decode)?
            .map(LookupId::new),
        location_id: row
            .try_get::<Option<i64>, _>("location_id")
            .map_err(decode)?
            .map(LocationId::new),
        registrations: u32::try_from(registrations).unwrap_or(u32::MAX),
    })
}

fn link_from_row(row: &PgRow) -> StoreResult<CourseLink> {
    Ok(CourseLink {
        id: LinkId::new(row.try_get("id").map_err(decode)?),
        course_id: CourseId::new(row.try_get("course_id").map_err(decode)?),
        title: row.try_get("title").map_err(decode)?,
        url: row.try_get("url").map_err(decode)?,
        linktype_id: row
            .try_get::<Option<i64>, _>("linktype_id")
            .map_err(decode)?
            .map(LookupId::new),
    })
}

fn lookup_from_row(row: &PgRow) -> StoreResult<Lookup> {
    Ok(Lookup {
        id: LookupId::new(row.try_get("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
    })
}

fn location_from_row(row: &PgRow) -> StoreResult<Location> {
    Ok(Location {
        id: LocationId::new(row.try_get("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
    })
}

fn attendance_from_row(row: &PgRow) -> StoreResult<Attendance> {
    Ok(Attendance {
        course_id: CourseId::new(row.try_get("course_id").map_err(decode)?),
        user_id: UserId::new(row.try_get("user_id").map_err(decode)?),
        attended: row.try_get("attended").map_err(decode)?,
    })
}

fn attendee_from_row(row: &PgRow) -> StoreResult<Attendee> {
    Ok(Attendee {
        user: user_from_row(row)?,
        attended: row.try_get("attended").map_err(decode)?,
    })
}

fn session_from_row(row: &PgRow) -> StoreResult<Session> {
    Ok(Session {
        token: SessionToken::from_uuid(row.try_get::<Uuid, _>("token").map_err(decode)?),
        user_id: UserId::new(row.try_get("user_id").map_err(decode)?),
        issued_at: row.try_get("issued_at").map_err(decode)?,
        expires_at: row.try_get("expires_at").map_err(decode)?,
    })
}

fn collect<T>(rows: Vec<PgRow>, f: fn(&PgRow) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(f).collect()
}

async fn attendees(conn: &mut PgConnection, course_id: CourseId) -> StoreResult<Vec<Attendee>> {
    let sql = format!(
        "SELECT {USER_COLUMNS}, a.attended FROM course_user_attended a \
         JOIN users u ON u.id = a.user_id WHERE a.course_id = $1 ORDER BY u.id"
    );
    let rows = sqlx::query(&sql)
        .bind(course_id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("attendees", e))?;
    collect(rows, attendee_from_row)
}

async fn presenters(conn: &mut PgConnection, course_id: CourseId) -> StoreResult<Vec<User>> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM course_presenters p \
         JOIN users u ON u.id = p.user_id WHERE p.course_id = $1 ORDER BY u.id"
    );
    let rows = sqlx::query(&sql)
        .bind(course_id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("presenters", e))?;
    collect(rows, user_from_row)
}

async fn links(conn: &mut PgConnection, course_id: CourseId) -> StoreResult<Vec<CourseLink>> {
    let sql = format!("SELECT {LINK_COLUMNS} FROM courselinks WHERE course_id = $1 ORDER BY id");
    let rows = sqlx::query(&sql)
        .bind(course_id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("links", e))?;
    collect(rows, link_from_row)
}

async fn course_by_id(conn: &mut PgConnection, id: CourseId) -> StoreResult<Option<Course>> {
    let sql = format!("SELECT {COURSE_COLUMNS} FROM courses c WHERE c.id = $1");
    let row = sqlx::query(&sql)
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("get_course", e))?;
    row.as_ref().map(course_from_row).transpose()
}

async fn user_by_id(conn: &mut PgConnection, id: UserId) -> StoreResult<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1");
    let row = sqlx::query(&sql)
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("get_user", e))?;
    row.as_ref().map(user_from_row).transpose()
}

#[async_trait]
impl UserStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn list_users(&self, usertype: Option<UserType>) -> StoreResult<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users u \
             WHERE ($1::INTEGER IS NULL OR u.usertype_id = $1) ORDER BY u.id"
        );
        let rows = sqlx::query(&sql)
            .bind(usertype.map(UserType::id))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
        collect(rows, user_from_row)
    }

    #[instrument(skip(self), err)]
    async fn users_at_location(&self, location_id: LocationId) -> StoreResult<Vec<User>> {
        let mut conn = self.conn().await?;
        exists(&mut conn, "locations", location_id.get(), "location").await?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.location_id = $1 ORDER BY u.id");
        let rows = sqlx::query(&sql)
            .bind(location_id.get())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("users_at_location", e))?;
        collect(rows, user_from_row)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let mut conn = self.conn().await?;
        user_by_id(&mut conn, id).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = $1");
        let row = sqlx::query(&sql)
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self), fields(email = %user.email), err)]
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users AS u (name, email, usertype_id, location_id) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.usertype.id())
            .bind(user.location_id.map(i64::from))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_user", e))?;
        user_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<User> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let mut user = user_by_id(&mut tx, id)
            .await?
            .ok_or(StoreError::NotFound("user"))?;
        user.apply(&changes)?;

        sqlx::query("UPDATE users SET name = $2, email = $3, usertype_id = $4 WHERE id = $1")
            .bind(id.get())
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.usertype.id())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_user", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn set_user_location(
        &self,
        id: UserId,
        location_id: Option<LocationId>,
    ) -> StoreResult<User> {
        let sql = format!(
            "UPDATE users AS u SET location_id = $2 WHERE u.id = $1 RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .bind(location_id.map(i64::from))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_user_location", e))?;
        match row {
            Some(row) => user_from_row(&row),
            None => Err(StoreError::NotFound("user")),
        }
    }

    #[instrument(skip(self), err)]
    async fn delete_user(&self, id: UserId) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        exists(&mut tx, "users", id.get(), "user").await?;

        for sql in [
            "DELETE FROM course_user_attended WHERE user_id = $1",
            "DELETE FROM course_presenters WHERE user_id = $1",
            "DELETE FROM sessions WHERE user_id = $1",
            "DELETE FROM users WHERE id = $1",
        ] {
            sqlx::query(sql)
                .bind(id.get())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_user", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

#[async_trait]
impl CourseStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn list_courses(&self) -> StoreResult<Vec<Course>> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses c ORDER BY c.id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_courses", e))?;
        collect(rows, course_from_row)
    }

    #[instrument(skip(self), err)]
    async fn courses_at_location(&self, location_id: LocationId) -> StoreResult<Vec<Course>> {
        let mut conn = self.conn().await?;
        exists(&mut conn, "locations", location_id.get(), "location").await?;
        let sql =
            format!("SELECT {COURSE_COLUMNS} FROM courses c WHERE c.location_id = $1 ORDER BY c.id");
        let rows = sqlx::query(&sql)
            .bind(location_id.get())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("courses_at_location", e))?;
        collect(rows, course_from_row)
    }

    async fn get_course(&self, id: CourseId) -> StoreResult<Option<Course>> {
        let mut conn = self.conn().await?;
        course_by_id(&mut conn, id).await
    }

    #[instrument(skip(self), err)]
    async fn most_popular_course(&self) -> StoreResult<Option<Course>> {
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM courses c ORDER BY registrations DESC, c.id ASC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("most_popular_course", e))?;
        row.as_ref().map(course_from_row).transpose()
    }

    #[instrument(skip(self), fields(title = %course.title), err)]
    async fn create_course(&self, course: NewCourse) -> StoreResult<Course> {
        let row = sqlx::query(
            r#"
            INSERT INTO courses (title, description, starts, ends, coursetype_id, location_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.starts)
        .bind(course.ends)
        .bind(course.coursetype_id.map(i64::from))
        .bind(course.location_id.map(i64::from))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_course", e))?;

        Ok(Course {
            id: CourseId::new(row.try_get("id").map_err(decode)?),
            title: course.title,
            description: course.description,
            starts: course.starts,
            ends: course.ends,
            coursetype_id: course.coursetype_id,
            location_id: course.location_id,
            registrations: 0,
        })
    }

    #[instrument(skip(self), err)]
    async fn update_course(&self, id: CourseId, changes: CourseChanges) -> StoreResult<Course> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let mut course = course_by_id(&mut tx, id)
            .await?
            .ok_or(StoreError::NotFound("course"))?;
        course.apply(&changes)?;

        sqlx::query(
            r#"
            UPDATE courses
            SET title = $2, description = $3, starts = $4, ends = $5,
                coursetype_id = $6, location_id = $7
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.starts)
        .bind(course.ends)
        .bind(course.coursetype_id.map(i64::from))
        .bind(course.location_id.map(i64::from))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_course", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(course)
    }

    #[instrument(skip(self), err)]
    async fn delete_course(&self, id: CourseId) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        exists(&mut tx, "courses", id.get(), "course").await?;

        for sql in [
            "DELETE FROM courselinks WHERE course_id = $1",
            "DELETE FROM course_user_attended WHERE course_id = $1",
            "DELETE FROM course_presenters WHERE course_id = $1",
            "DELETE FROM courses WHERE id = $1",
        ] {
            sqlx::query(sql)
                .bind(id.get())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_course", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    async fn list_links(&self, course_id: CourseId) -> StoreResult<Vec<CourseLink>> {
        let mut conn = self.conn().await?;
        exists(&mut conn, "courses", course_id.get(), "course").await?;
        links(&mut conn, course_id).await
    }

    async fn get_link(
        &self,
        course_id: CourseId,
        link_id: LinkId,
    ) -> StoreResult<Option<CourseLink>> {
        let sql = format!("SELECT {LINK_COLUMNS} FROM courselinks WHERE id = $1 AND course_id = $2");
        let row = sqlx::query(&sql)
            .bind(link_id.get())
            .bind(course_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_link", e))?;
        row.as_ref().map(link_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn create_link(&self, course_id: CourseId, link: NewCourseLink) -> StoreResult<CourseLink> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        exists(&mut tx, "courses", course_id.get(), "course").await?;

        let sql = format!(
            "INSERT INTO courselinks (course_id, title, url, linktype_id) \
             VALUES ($1, $2, $3, $4) RETURNING {LINK_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(course_id.get())
            .bind(&link.title)
            .bind(&link.url)
            .bind(link.linktype_id.map(i64::from))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_link", e))?;
        let link = link_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(link)
    }

    #[instrument(skip(self), err)]
    async fn update_link(
        &self,
        course_id: CourseId,
        link_id: LinkId,
        changes: CourseLinkChanges,
    ) -> StoreResult<CourseLink> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM courselinks WHERE id = $1 AND course_id = $2 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(link_id.get())
            .bind(course_id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_link", e))?
            .ok_or(StoreError::NotFound("link"))?;
        let mut link = link_from_row(&row)?;
        link.apply(&changes)?;

        sqlx::query("UPDATE courselinks SET title = $2, url = $3, linktype_id = $4 WHERE id = $1")
            .bind(link_id.get())
            .bind(&link.title)
            .bind(&link.url)
            .bind(link.linktype_id.map(i64::from))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_link", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(link)
    }

    #[instrument(skip(self), err)]
    async fn delete_link(
        &self,
        course_id: CourseId,
        link_id: LinkId,
    ) -> StoreResult<Vec<CourseLink>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let deleted = sqlx::query("DELETE FROM courselinks WHERE id = $1 AND course_id = $2")
            .bind(link_id.get())
            .bind(course_id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_link", e))?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound("link"));
        }
        let remaining = links(&mut tx, course_id).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(remaining)
    }

    async fn list_presenters(&self, course_id: CourseId) -> StoreResult<Vec<User>> {
        let mut conn = self.conn().await?;
        exists(&mut conn, "courses", course_id.get(), "course").await?;
        presenters(&mut conn, course_id).await
    }

    async fn is_presenting(&self, course_id: CourseId, user_id: UserId) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 FROM course_presenters WHERE course_id = $1 AND user_id = $2")
            .bind(course_id.get())
            .bind(user_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("is_presenting", e))?;
        Ok(row.is_some())
    }

    #[instrument(skip(self), err)]
    async fn add_presenter(&self, course_id: CourseId, user_id: UserId) -> StoreResult<Vec<User>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        exists(&mut tx, "courses", course_id.get(), "course").await?;
        exists(&mut tx, "users", user_id.get(), "user").await?;

        sqlx::query(
            "INSERT INTO course_presenters (course_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(course_id.get())
        .bind(user_id.get())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("add_presenter", e))?;
        let all = presenters(&mut tx, course_id).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(all)
    }

    #[instrument(skip(self), err)]
    async fn remove_presenter(
        &self,
        course_id: CourseId,
        user_id: UserId,
    ) -> StoreResult<Vec<User>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        exists(&mut tx, "courses", course_id.get(), "course").await?;

        let deleted =
            sqlx::query("DELETE FROM course_presenters WHERE course_id = $1 AND user_id = $2")
                .bind(course_id.get())
                .bind(user_id.get())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("remove_presenter", e))?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound("presenter"));
        }
        let remaining = presenters(&mut tx, course_id).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(remaining)
    }

    async fn presenting(&self, user_id: UserId) -> StoreResult<Vec<Course>> {
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM courses c \
             JOIN course_presenters p ON p.course_id = c.id \
             WHERE p.user_id = $1 ORDER BY c.id"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("presenting", e))?;
        collect(rows, course_from_row)
    }
}

#[async_trait]
impl AttendanceStore for PostgresStore {
    async fn list_attendees(&self, course_id: CourseId) -> StoreResult<Vec<Attendee>> {
        let mut conn = self.conn().await?;
        exists(&mut conn, "courses", course_id.get(), "course").await?;
        attendees(&mut conn, course_id).await
    }

    #[instrument(skip(self), err)]
    async fn register(&self, course_id: CourseId, user_id: UserId) -> StoreResult<Attendance> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        exists(&mut tx, "courses", course_id.get(), "course").await?;
        exists(&mut tx, "users", user_id.get(), "user").await?;

        let row = sqlx::query(
            r#"
            INSERT INTO course_user_attended (course_id, user_id, attended)
            VALUES ($1, $2, FALSE)
            RETURNING course_id, user_id, attended
            "#,
        )
        .bind(course_id.get())
        .bind(user_id.get())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "user {user_id} is already registered for course {course_id}"
                ))
            } else {
                map_sqlx_error("register", e)
            }
        })?;
        let attendance = attendance_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(attendance)
    }

    #[instrument(skip(self), err)]
    async fn confirm(&self, course_id: CourseId, user_id: UserId) -> StoreResult<Attendance> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        exists(&mut tx, "courses", course_id.get(), "course").await?;

        let row = sqlx::query(
            r#"
            UPDATE course_user_attended SET attended = TRUE
            WHERE course_id = $1 AND user_id = $2
            RETURNING course_id, user_id, attended
            "#,
        )
        .bind(course_id.get())
        .bind(user_id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("confirm", e))?
        .ok_or(StoreError::NotFound("registration"))?;
        let attendance = attendance_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(attendance)
    }

    #[instrument(skip(self), fields(count = user_ids.len()), err)]
    async fn confirm_many(
        &self,
        course_id: CourseId,
        user_ids: &[UserId],
    ) -> StoreResult<Vec<Attendee>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        exists(&mut tx, "courses", course_id.get(), "course").await?;

        for user_id in user_ids {
            let updated = sqlx::query(
                "UPDATE course_user_attended SET attended = TRUE WHERE course_id = $1 AND user_id = $2",
            )
            .bind(course_id.get())
            .bind(user_id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("confirm_many", e))?;
            // Dropping `tx` rolls back the rows confirmed so far.
            if updated.rows_affected() == 0 {
                return Err(StoreError::NotFound("registration"));
            }
        }
        let all = attendees(&mut tx, course_id).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(all)
    }

    #[instrument(skip(self), err)]
    async fn unregister(&self, course_id: CourseId, user_id: UserId) -> StoreResult<Vec<Attendee>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        exists(&mut tx, "courses", course_id.get(), "course").await?;

        let deleted =
            sqlx::query("DELETE FROM course_user_attended WHERE course_id = $1 AND user_id = $2")
                .bind(course_id.get())
                .bind(user_id.get())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("unregister", e))?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound("registration"));
        }
        let remaining = attendees(&mut tx, course_id).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(remaining)
    }

    async fn registrations(
        &self,
        user_id: UserId,
        confirmed_only: bool,
    ) -> StoreResult<Vec<Registration>> {
        let sql = format!(
            "SELECT {COURSE_COLUMNS}, a.attended FROM courses c \
             JOIN course_user_attended a ON a.course_id = c.id \
             WHERE a.user_id = $1 AND (a.attended OR NOT $2) ORDER BY c.id"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.get())
            .bind(confirmed_only)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("registrations", e))?;
        rows.iter()
            .map(|row| {
                Ok(Registration {
                    course: course_from_row(row)?,
                    attended: row.try_get("attended").map_err(decode)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ReferenceStore for PostgresStore {
    async fn list_lookups(&self, kind: LookupKind) -> StoreResult<Vec<Lookup>> {
        let sql = format!("SELECT id::BIGINT AS id, name FROM {} ORDER BY id", kind.table());
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_lookups", e))?;
        collect(rows, lookup_from_row)
    }

    async fn get_lookup(&self, kind: LookupKind, id: LookupId) -> StoreResult<Option<Lookup>> {
        let sql = format!("SELECT id::BIGINT AS id, name FROM {} WHERE id = $1", kind.table());
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_lookup", e))?;
        row.as_ref().map(lookup_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn create_lookup(&self, kind: LookupKind, name: String) -> StoreResult<Lookup> {
        if kind == LookupKind::UserType {
            return Err(StoreError::Validation("user types are fixed".to_string()));
        }
        let name = Lookup::validate_name(&name)?;
        let sql = format!(
            "INSERT INTO {} (name) VALUES ($1) RETURNING id::BIGINT AS id, name",
            kind.table()
        );
        let row = sqlx::query(&sql)
            .bind(&name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_lookup", e))?;
        lookup_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn rename_lookup(
        &self,
        kind: LookupKind,
        id: LookupId,
        name: String,
    ) -> StoreResult<Lookup> {
        let name = Lookup::validate_name(&name)?;
        let sql = format!(
            "UPDATE {} SET name = $2 WHERE id = $1 RETURNING id::BIGINT AS id, name",
            kind.table()
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .bind(&name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("rename_lookup", e))?
            .ok_or(StoreError::NotFound(kind.entity_name()))?;
        lookup_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn delete_lookup(&self, kind: LookupKind, id: LookupId) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        exists(&mut tx, kind.table(), id.get(), kind.entity_name()).await?;

        let usage = match kind {
            LookupKind::CourseType => Some("SELECT 1 FROM courses WHERE coursetype_id = $1 LIMIT 1"),
            LookupKind::CourseLinkType => {
                Some("SELECT 1 FROM courselinks WHERE linktype_id = $1 LIMIT 1")
            }
            LookupKind::UserType => None,
        };
        let in_use = match usage {
            Some(sql) => sqlx::query(sql)
                .bind(id.get())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_lookup", e))?
                .is_some(),
            None => true,
        };
        if in_use {
            return Err(StoreError::Conflict(format!(
                "{} {id} is still in use",
                kind.entity_name()
            )));
        }

        let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
        sqlx::query(&sql)
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_lookup", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    async fn list_locations(&self) -> StoreResult<Vec<Location>> {
        let rows = sqlx::query("SELECT id, name FROM locations ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_locations", e))?;
        collect(rows, location_from_row)
    }

    async fn get_location(&self, id: LocationId) -> StoreResult<Option<Location>> {
        let row = sqlx::query("SELECT id, name FROM locations WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_location", e))?;
        row.as_ref().map(location_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn create_location(&self, location: NewLocation) -> StoreResult<Location> {
        let row = sqlx::query("INSERT INTO locations (name) VALUES ($1) RETURNING id, name")
            .bind(&location.name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_location", e))?;
        location_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn rename_location(&self, id: LocationId, location: NewLocation) -> StoreResult<Location> {
        let row = sqlx::query("UPDATE locations SET name = $2 WHERE id = $1 RETURNING id, name")
            .bind(id.get())
            .bind(&location.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("rename_location", e))?
            .ok_or(StoreError::NotFound("location"))?;
        location_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn delete_location(&self, id: LocationId) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        exists(&mut tx, "locations", id.get(), "location").await?;

        let in_use = sqlx::query(
            r#"
            SELECT 1 WHERE EXISTS (SELECT 1 FROM users WHERE location_id = $1)
                        OR EXISTS (SELECT 1 FROM courses WHERE location_id = $1)
            "#,
        )
        .bind(id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_location", e))?
        .is_some();
        if in_use {
            return Err(StoreError::Conflict(format!("location {id} is still in use")));
        }

        sqlx::query("DELETE FROM locations WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_location", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    #[instrument(skip(self, session), fields(user_id = %session.user_id), err)]
    async fn create_session(&self, session: Session) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        exists(&mut tx, "users", session.user_id.get(), "user").await?;

        sqlx::query(
            "INSERT INTO sessions (token, user_id, issued_at, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(session.token.as_uuid())
        .bind(session.user_id.get())
        .bind(session.issued_at)
        .bind(session.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_session", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    async fn get_session(&self, token: SessionToken) -> StoreResult<Option<Session>> {
        let row = sqlx::query(
            "SELECT token, user_id, issued_at, expires_at FROM sessions WHERE token = $1",
        )
        .bind(token.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_session", e))?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn delete_session(&self, token: SessionToken) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_session", e))?;
        Ok(())
    }
}

fn decode(err: sqlx::Error) -> StoreError {
    map_sqlx_error("decode_row", err)
}

/// Map SQLx errors to store errors.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            map_database_error(operation, db_err.code().as_deref(), db_err.message())
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// Constraint violations get a fixed public message; the server text is only logged.
fn map_database_error(operation: &str, code: Option<&str>, message: &str) -> StoreError {
    match code {
        Some("23505") => {
            tracing::warn!(operation, detail = message, "unique constraint violated");
            StoreError::Conflict(format!("{operation}: value already exists"))
        }
        Some("23503") => {
            tracing::warn!(operation, detail = message, "foreign key violated");
            StoreError::Validation(format!("{operation}: referenced row does not exist"))
        }
        Some("23514") => {
            tracing::warn!(operation, detail = message, "check constraint violated");
            StoreError::Validation(format!("{operation}: value violates a check constraint"))
        }
        _ => StoreError::Backend(format!("database error in {operation}: {message}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}
