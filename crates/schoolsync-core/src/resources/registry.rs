use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Duration;
use futures::future::join_all;
use tracing::{debug, info};

use super::atom::ResourceAtom;
use crate::api::{ApiError, RequestGateway};
use crate::clock::Clock;
use crate::models::{Record, RecordId};

/// Parent record kinds a collection can be filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Student,
    Subject,
    Teacher,
    Enrollment,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Student => "student",
            Scope::Subject => "subject",
            Scope::Teacher => "teacher",
            Scope::Enrollment => "enrollment",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Scope::Student),
            "subject" => Ok(Scope::Subject),
            "teacher" => Ok(Scope::Teacher),
            "enrollment" => Ok(Scope::Enrollment),
            other => Err(ApiError::InvalidRequest(format!("Unknown scope '{}'", other))),
        }
    }
}

/// The remote collections the portal exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Teachers,
    Religions,
    Enrollments,
    Attendance,
    SubjectTeachers,
    Classes,
    Exams,
    Subjects,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::Teachers,
        Collection::Religions,
        Collection::Enrollments,
        Collection::Attendance,
        Collection::SubjectTeachers,
        Collection::Classes,
        Collection::Exams,
        Collection::Subjects,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Teachers => "teachers",
            Collection::Religions => "religions",
            Collection::Enrollments => "enrollments",
            Collection::Attendance => "attendance",
            Collection::SubjectTeachers => "subject-teachers",
            Collection::Classes => "classes",
            Collection::Exams => "exams",
            Collection::Subjects => "subjects",
        }
    }

    pub fn path(&self) -> String {
        format!("/{}", self.name())
    }

    /// Reference data that rarely changes and is served from the TTL cache.
    pub fn is_reference(&self) -> bool {
        matches!(self, Collection::Religions)
    }

    /// Scopes the server accepts for `/<collection>/<scope>/<id>`.
    pub fn scopes(&self) -> &'static [Scope] {
        match self {
            Collection::Enrollments => &[Scope::Student, Scope::Subject],
            Collection::Attendance => &[Scope::Enrollment, Scope::Subject, Scope::Student],
            Collection::SubjectTeachers => &[Scope::Subject, Scope::Teacher],
            _ => &[],
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Collection::ALL
            .into_iter()
            .find(|c| c.name() == normalized)
            .ok_or_else(|| ApiError::InvalidRequest(format!("Unknown collection '{}'", s)))
    }
}

/// One atom per portal collection, all sharing a gateway.
pub struct Resources {
    pub teachers: ResourceAtom<Record>,
    pub religions: ResourceAtom<Record>,
    pub enrollments: ResourceAtom<Record>,
    pub attendance: ResourceAtom<Record>,
    pub subject_teachers: ResourceAtom<Record>,
    pub classes: ResourceAtom<Record>,
    pub exams: ResourceAtom<Record>,
    pub subjects: ResourceAtom<Record>,
}

impl Resources {
    pub fn new(gateway: Arc<RequestGateway>, clock: Arc<dyn Clock>, reference_ttl: Duration) -> Self {
        let build = |collection: Collection| {
            if collection.is_reference() {
                ResourceAtom::cached(collection.path(), gateway.clone(), reference_ttl, clock.clone())
            } else {
                ResourceAtom::new(collection.path(), gateway.clone())
            }
        };

        Self {
            teachers: build(Collection::Teachers),
            religions: build(Collection::Religions),
            enrollments: build(Collection::Enrollments),
            attendance: build(Collection::Attendance),
            subject_teachers: build(Collection::SubjectTeachers),
            classes: build(Collection::Classes),
            exams: build(Collection::Exams),
            subjects: build(Collection::Subjects),
        }
    }

    pub fn atom(&self, collection: Collection) -> &ResourceAtom<Record> {
        match collection {
            Collection::Teachers => &self.teachers,
            Collection::Religions => &self.religions,
            Collection::Enrollments => &self.enrollments,
            Collection::Attendance => &self.attendance,
            Collection::SubjectTeachers => &self.subject_teachers,
            Collection::Classes => &self.classes,
            Collection::Exams => &self.exams,
            Collection::Subjects => &self.subjects,
        }
    }

    /// Scoped list fetch, rejecting scopes the collection has no route for
    /// before anything is sent.
    pub async fn list_in(
        &self,
        collection: Collection,
        scope: Scope,
        id: &RecordId,
    ) -> Result<Vec<Record>, ApiError> {
        if !collection.scopes().contains(&scope) {
            return Err(ApiError::InvalidRequest(format!(
                "{} cannot be listed by {}",
                collection, scope
            )));
        }
        self.atom(collection).get_all_in(scope, id).await
    }

    /// Fetch every collection concurrently. Each result reports the record
    /// count or the failure for that collection; one failure does not stop
    /// the others.
    pub async fn refresh_all(&self) -> Vec<(Collection, Result<usize, ApiError>)> {
        info!("Refreshing all collections");
        let results = join_all(Collection::ALL.into_iter().map(|collection| async move {
            let result = self.atom(collection).get_all().await.map(|records| records.len());
            (collection, result)
        }))
        .await;

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        debug!(failed, total = results.len(), "Refresh finished");
        results
    }

    /// Forget everything fetched so far, e.g. after the user signs out.
    pub fn reset(&self) {
        for collection in Collection::ALL {
            self.atom(collection).reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedTransport;
    use crate::api::HttpResponse;
    use crate::auth::{MemorySessionStorage, SessionContext};
    use crate::clock::ManualClock;

    fn resources(transport: Arc<ScriptedTransport>) -> Resources {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let session = SessionContext::create(Arc::new(MemorySessionStorage::new()), clock.clone());
        let gateway = Arc::new(RequestGateway::new("https://api.school.test", transport, session));
        Resources::new(gateway, clock, Duration::minutes(5))
    }

    #[test]
    fn test_collection_names_parse() {
        assert_eq!("teachers".parse::<Collection>().unwrap(), Collection::Teachers);
        assert_eq!(
            "subject_teachers".parse::<Collection>().unwrap(),
            Collection::SubjectTeachers
        );
        assert_eq!(
            "Subject-Teachers".parse::<Collection>().unwrap(),
            Collection::SubjectTeachers
        );
        assert!(matches!(
            "grades".parse::<Collection>(),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_paths() {
        assert_eq!(Collection::SubjectTeachers.path(), "/subject-teachers");
        assert_eq!(Collection::Attendance.path(), "/attendance");
        assert_eq!("Enrollment".parse::<Scope>().unwrap(), Scope::Enrollment);
    }

    #[test]
    fn test_only_religions_are_cached() {
        let resources = resources(Arc::new(ScriptedTransport::new()));
        for collection in Collection::ALL {
            assert_eq!(
                resources.atom(collection).is_cached(),
                collection == Collection::Religions
            );
            assert_eq!(resources.atom(collection).path(), collection.path());
        }
    }

    #[tokio::test]
    async fn test_list_in_rejects_unknown_route() {
        let transport = Arc::new(ScriptedTransport::new());
        let resources = resources(transport.clone());

        let result = resources
            .list_in(Collection::Teachers, Scope::Student, &RecordId::Number(1))
            .await;
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_list_in_attendance_by_enrollment() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(HttpResponse::new(200, r#"[{"id":1,"status":"present"}]"#));
        let resources = resources(transport.clone());

        let records = resources
            .list_in(Collection::Attendance, Scope::Enrollment, &RecordId::Number(12))
            .await
            .unwrap();
        assert_eq!(records[0].get_str("status"), Some("present"));
        assert_eq!(
            transport.sent()[0].url,
            "https://api.school.test/attendance/enrollment/12"
        );
    }

    #[tokio::test]
    async fn test_refresh_all_reports_each_collection() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..7 {
            transport.push(HttpResponse::new(200, r#"[{"id":1}]"#));
        }
        transport.push(HttpResponse::new(503, ""));
        let resources = resources(transport.clone());

        let results = resources.refresh_all().await;
        assert_eq!(results.len(), Collection::ALL.len());
        assert_eq!(results.iter().filter(|(_, r)| r.is_err()).count(), 1);
        assert_eq!(transport.sent_count(), 8);
    }

    #[tokio::test]
    async fn test_reset_clears_every_atom() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(HttpResponse::new(200, r#"[{"id":1}]"#));
        let resources = resources(transport);

        resources.teachers.get_all().await.unwrap();
        assert!(resources.teachers.state().is_loaded());
        resources.reset();
        assert!(!resources.teachers.state().is_loaded());
    }
}
