use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use super::{clean_tags, resolve_subject, RecordError};
use crate::config::{MAX_FILE_BYTES, MAX_UPLOAD_FILES};
use crate::consent::has_capability;
use crate::db::repository;
use crate::mailer::{report_uploaded_email, EmailMessage};
use crate::models::{Capability, MedicalReport, Principal, ReportFileMeta};
use crate::storage::{FileStore, StoredFile};

/// One file received from a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

fn validate_file(file: &UploadedFile) -> Result<(), RecordError> {
    let accepted = file.content_type == "application/pdf" || file.content_type.starts_with("image/");
    if !accepted {
        return Err(RecordError::BadRequest(format!(
            "Unsupported file type for {}: only PDF and images are accepted",
            file.file_name
        )));
    }
    if file.bytes.is_empty() {
        return Err(RecordError::BadRequest(format!("{} is empty", file.file_name)));
    }
    if file.bytes.len() > MAX_FILE_BYTES {
        return Err(RecordError::BadRequest(format!(
            "{} exceeds the {} MiB limit",
            file.file_name,
            MAX_FILE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Writes are allowed to the patient themself, or to a connected doctor
/// holding `update_records`.
fn authorize_write(conn: &Connection, principal: &Principal, patient_id: &Uuid) -> Result<(), RecordError> {
    if principal.is_patient() {
        return Ok(());
    }
    if has_capability(conn, patient_id, &principal.user_id, Capability::UpdateRecords)? {
        Ok(())
    } else {
        Err(RecordError::Forbidden(
            "You do not have permission to update this patient's records",
        ))
    }
}

/// Remove a stored file, logging instead of failing.
fn discard_file(files: &dyn FileStore, file_url: &str) {
    if let Err(e) = files.remove(file_url) {
        tracing::warn!(file_url = %file_url, "Failed to remove stored report file: {e}");
    }
}

fn discard_reports(files: &dyn FileStore, reports: &[MedicalReport]) {
    for report in reports {
        discard_file(files, &report.file_url);
    }
}

/// Store 1 to 5 files as separate reports, all or none. `tags[i]` belongs to file `i`.
pub fn upload_reports(
    conn: &Connection,
    files: &dyn FileStore,
    principal: &Principal,
    patient_id: Option<Uuid>,
    uploads: Vec<UploadedFile>,
    tags: Vec<Vec<String>>,
) -> Result<Vec<MedicalReport>, RecordError> {
    if uploads.is_empty() {
        return Err(RecordError::BadRequest("At least one file is required".into()));
    }
    if uploads.len() > MAX_UPLOAD_FILES {
        return Err(RecordError::BadRequest(format!(
            "At most {MAX_UPLOAD_FILES} files can be uploaded at once"
        )));
    }
    if tags.len() > uploads.len() {
        return Err(RecordError::BadRequest(
            "More tag lists than uploaded files".into(),
        ));
    }
    uploads.iter().try_for_each(validate_file)?;

    let patient_id = resolve_subject(principal, patient_id)?;
    authorize_write(conn, principal, &patient_id)?;

    let mut tags = tags.into_iter();
    let mut reports: Vec<MedicalReport> = Vec::with_capacity(uploads.len());
    for upload in &uploads {
        let stored = match files.save(&upload.file_name, &upload.content_type, &upload.bytes) {
            Ok(stored) => stored,
            Err(e) => {
                discard_reports(files, &reports);
                return Err(e.into());
            }
        };
        reports.push(MedicalReport {
            id: Uuid::new_v4(),
            patient_id,
            uploaded_by: principal.user_id,
            file_url: stored.file_url,
            file_name: stored.file_name,
            file_type: stored.file_type,
            uploaded_at: Utc::now(),
            tags: clean_tags(tags.next().unwrap_or_default()),
            update_history: vec![],
        });
    }

    if let Err(e) = repository::insert_reports(conn, &reports) {
        discard_reports(files, &reports);
        return Err(e.into());
    }

    for report in &reports {
        tracing::info!(
            patient_id = %patient_id,
            report_id = %report.id,
            uploaded_by = %principal.user_id,
            "Report uploaded"
        );
    }
    Ok(reports)
}

/// Swap the file behind a report. The previous metadata goes onto the
/// report's history and the previous file is removed.
pub fn update_report(
    conn: &Connection,
    files: &dyn FileStore,
    principal: &Principal,
    patient_id: Option<Uuid>,
    report_id: &Uuid,
    upload: UploadedFile,
    tags: Option<Vec<String>>,
) -> Result<MedicalReport, RecordError> {
    validate_file(&upload)?;
    let patient_id = resolve_subject(principal, patient_id)?;
    authorize_write(conn, principal, &patient_id)?;

    let current = repository::get_report(conn, report_id)?
        .filter(|r| r.patient_id == patient_id)
        .ok_or(RecordError::NotFound("Report"))?;

    let StoredFile {
        file_url,
        file_name,
        file_type,
    } = files.save(&upload.file_name, &upload.content_type, &upload.bytes)?;
    let replacement = ReportFileMeta {
        file_url,
        file_name,
        file_type,
        tags: tags.map(clean_tags).unwrap_or_else(|| current.tags.clone()),
    };

    let updated = match repository::replace_report_file(conn, report_id, &principal.user_id, &replacement) {
        Ok(updated) => updated,
        Err(e) => {
            discard_file(files, &replacement.file_url);
            return Err(e.into());
        }
    };
    discard_file(files, &current.file_url);

    tracing::info!(
        patient_id = %patient_id,
        report_id = %report_id,
        updated_by = %principal.user_id,
        revision = updated.update_history.len(),
        "Report updated"
    );
    Ok(updated)
}

/// Patient-only. The record goes first; the stored file is removed best-effort.
pub fn delete_report(
    conn: &Connection,
    files: &dyn FileStore,
    principal: &Principal,
    report_id: &Uuid,
) -> Result<(), RecordError> {
    if !principal.is_patient() {
        return Err(RecordError::Forbidden("Only patients can delete reports"));
    }
    let report = repository::get_report(conn, report_id)?
        .filter(|r| r.patient_id == principal.user_id)
        .ok_or(RecordError::NotFound("Report"))?;

    repository::delete_report(conn, report_id)?;
    discard_file(files, &report.file_url);

    tracing::info!(patient_id = %principal.user_id, report_id = %report_id, "Report deleted");
    Ok(())
}

/// A patient reads their own reports; a doctor needs `reports_access`.
pub fn list_reports(
    conn: &Connection,
    principal: &Principal,
    patient_id: Option<Uuid>,
) -> Result<Vec<MedicalReport>, RecordError> {
    let patient_id = resolve_subject(principal, patient_id)?;
    if principal.is_doctor()
        && !has_capability(conn, &patient_id, &principal.user_id, Capability::ReportsAccess)?
    {
        return Err(RecordError::Forbidden(
            "You do not have access to this patient's reports",
        ));
    }
    Ok(repository::list_reports(conn, &patient_id)?)
}

/// Email telling a patient that a doctor added reports. `None` when the
/// patient uploaded them.
pub fn upload_notification(
    conn: &Connection,
    principal: &Principal,
    reports: &[MedicalReport],
) -> Result<Option<EmailMessage>, RecordError> {
    let Some(first) = reports.first() else {
        return Ok(None);
    };
    if !principal.is_doctor() {
        return Ok(None);
    }
    let (Some(patient), Some(doctor)) = (
        repository::get_user(conn, &first.patient_id)?,
        repository::get_user(conn, &principal.user_id)?,
    ) else {
        return Ok(None);
    };

    let names: Vec<String> = reports.iter().map(|r| r.file_name.clone()).collect();
    Ok(Some(report_uploaded_email(
        &patient.email,
        &patient.name,
        &doctor.name,
        &names,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::{approve, disconnect, request_connection, PatientRef};
    use crate::db::repository::fixtures::{seed_doctor, seed_patient};
    use crate::db::sqlite::open_memory_database;
    use crate::models::CapabilityPatch;
    use crate::storage::{DiskFileStore, StorageError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        _dir: tempfile::TempDir,
        conn: Connection,
        files: DiskFileStore,
        patient: Principal,
        doctor: Principal,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let files = DiskFileStore::new(dir.path().join("uploads")).unwrap();
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Ada").principal();
        let doctor = seed_doctor(&conn, "Grey").principal();
        Fixture {
            _dir: dir,
            conn,
            files,
            patient,
            doctor,
        }
    }

    fn connect(f: &Fixture, grants: CapabilityPatch) {
        request_connection(&f.conn, &f.doctor, PatientRef::Id(f.patient.user_id), None).unwrap();
        approve(&f.conn, &f.patient, &f.doctor.user_id, true, &grants).unwrap();
    }

    fn pdf(name: &str) -> UploadedFile {
        UploadedFile {
            file_name: name.into(),
            content_type: "application/pdf".into(),
            bytes: b"%PDF-1.7 test".to_vec(),
        }
    }

    fn stored_path(f: &Fixture, file_url: &str) -> std::path::PathBuf {
        f.files.root().join(file_url.trim_start_matches("uploads/"))
    }

    #[test]
    fn patient_uploads_with_parallel_tags() {
        let f = fixture();
        let reports = upload_reports(
            &f.conn,
            &f.files,
            &f.patient,
            None,
            vec![pdf("a.pdf"), pdf("b.pdf")],
            vec![vec!["lab".into()]],
        )
        .unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].tags, vec!["lab".to_string()]);
        assert!(reports[1].tags.is_empty());
        assert!(stored_path(&f, &reports[0].file_url).exists());
        assert_eq!(list_reports(&f.conn, &f.patient, None).unwrap().len(), 2);
        assert!(upload_notification(&f.conn, &f.patient, &reports).unwrap().is_none());
    }

    /// Delegates to a real store but fails the `fail_at`-th save.
    struct FlakyStore {
        inner: DiskFileStore,
        saves: AtomicUsize,
        fail_at: usize,
    }

    impl FileStore for FlakyStore {
        fn save(&self, name: &str, content_type: &str, bytes: &[u8]) -> Result<StoredFile, StorageError> {
            if self.saves.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.save(name, content_type, bytes)
        }

        fn remove(&self, file_url: &str) -> Result<(), StorageError> {
            self.inner.remove(file_url)
        }
    }

    #[test]
    fn failed_batch_leaves_no_rows_or_files() {
        let f = fixture();
        let flaky = FlakyStore {
            inner: DiskFileStore::new(f.files.root()).unwrap(),
            saves: AtomicUsize::new(0),
            fail_at: 2,
        };

        let result = upload_reports(
            &f.conn,
            &flaky,
            &f.patient,
            None,
            vec![pdf("a.pdf"), pdf("b.pdf"), pdf("c.pdf")],
            vec![],
        );
        assert!(matches!(result, Err(RecordError::Storage(_))));
        assert!(list_reports(&f.conn, &f.patient, None).unwrap().is_empty());
        assert_eq!(std::fs::read_dir(f.files.root()).unwrap().count(), 0);
    }

    #[test]
    fn upload_limits_are_enforced() {
        let f = fixture();
        let too_many: Vec<UploadedFile> = (0..6).map(|i| pdf(&format!("{i}.pdf"))).collect();
        let text = UploadedFile {
            file_name: "notes.txt".into(),
            content_type: "text/plain".into(),
            bytes: b"hi".to_vec(),
        };

        for (uploads, tags) in [
            (vec![], vec![]),
            (too_many, vec![]),
            (vec![text], vec![]),
            (vec![pdf("a.pdf")], vec![vec![], vec![]]),
        ] {
            assert!(matches!(
                upload_reports(&f.conn, &f.files, &f.patient, None, uploads, tags),
                Err(RecordError::BadRequest(_))
            ));
        }
    }

    #[test]
    fn doctor_upload_requires_update_records() {
        let f = fixture();
        connect(
            &f,
            CapabilityPatch {
                reports_access: Some(true),
                ..Default::default()
            },
        );
        assert!(matches!(
            upload_reports(&f.conn, &f.files, &f.doctor, Some(f.patient.user_id), vec![pdf("a.pdf")], vec![]),
            Err(RecordError::Forbidden(_))
        ));

        let patch = CapabilityPatch {
            update_records: Some(true),
            ..Default::default()
        };
        crate::consent::update_capabilities(&f.conn, &f.patient, &f.doctor.user_id, &patch).unwrap();
        let reports = upload_reports(
            &f.conn,
            &f.files,
            &f.doctor,
            Some(f.patient.user_id),
            vec![pdf("a.pdf")],
            vec![],
        )
        .unwrap();
        assert_eq!(reports[0].uploaded_by, f.doctor.user_id);

        let email = upload_notification(&f.conn, &f.doctor, &reports).unwrap().unwrap();
        assert_eq!(email.to, "ada@example.org");
        assert!(email.body.contains("a.pdf"));
    }

    #[test]
    fn doctor_read_requires_reports_access() {
        let f = fixture();
        connect(&f, CapabilityPatch::default());
        upload_reports(&f.conn, &f.files, &f.patient, None, vec![pdf("a.pdf")], vec![]).unwrap();
        assert!(matches!(
            list_reports(&f.conn, &f.doctor, Some(f.patient.user_id)),
            Err(RecordError::Forbidden(_))
        ));

        let patch = CapabilityPatch {
            reports_access: Some(true),
            ..Default::default()
        };
        crate::consent::update_capabilities(&f.conn, &f.patient, &f.doctor.user_id, &patch).unwrap();
        assert_eq!(list_reports(&f.conn, &f.doctor, Some(f.patient.user_id)).unwrap().len(), 1);

        disconnect(&f.conn, &f.patient, &f.doctor.user_id).unwrap();
        assert!(matches!(
            list_reports(&f.conn, &f.doctor, Some(f.patient.user_id)),
            Err(RecordError::Forbidden(_))
        ));
    }

    #[test]
    fn update_appends_history_and_removes_old_file() {
        let f = fixture();
        let original = upload_reports(
            &f.conn,
            &f.files,
            &f.patient,
            None,
            vec![pdf("a.pdf")],
            vec![vec!["lab".into()]],
        )
        .unwrap()
        .remove(0);

        let replacement = UploadedFile {
            file_name: "scan.png".into(),
            content_type: "image/png".into(),
            bytes: vec![1, 2, 3],
        };
        let updated =
            update_report(&f.conn, &f.files, &f.patient, None, &original.id, replacement, None).unwrap();

        assert_eq!(updated.file_name, "scan.png");
        assert_eq!(updated.tags, vec!["lab".to_string()]);
        assert_eq!(updated.update_history.len(), 1);
        assert_eq!(updated.update_history[0].previous_data, original.file_meta());
        assert!(!stored_path(&f, &original.file_url).exists());
        assert!(stored_path(&f, &updated.file_url).exists());
    }

    #[test]
    fn update_of_other_patients_report_is_not_found() {
        let f = fixture();
        let other = seed_patient(&f.conn, "Bob").principal();
        let report = upload_reports(&f.conn, &f.files, &other, None, vec![pdf("a.pdf")], vec![])
            .unwrap()
            .remove(0);

        assert!(matches!(
            update_report(&f.conn, &f.files, &f.patient, None, &report.id, pdf("b.pdf"), None),
            Err(RecordError::NotFound(_))
        ));
    }

    #[test]
    fn delete_is_patient_only_and_removes_file() {
        let f = fixture();
        let report = upload_reports(&f.conn, &f.files, &f.patient, None, vec![pdf("a.pdf")], vec![])
            .unwrap()
            .remove(0);

        assert!(matches!(
            delete_report(&f.conn, &f.files, &f.doctor, &report.id),
            Err(RecordError::Forbidden(_))
        ));
        delete_report(&f.conn, &f.files, &f.patient, &report.id).unwrap();
        assert!(!stored_path(&f, &report.file_url).exists());
        assert!(matches!(
            delete_report(&f.conn, &f.files, &f.patient, &report.id),
            Err(RecordError::NotFound(_))
        ));
    }
}
