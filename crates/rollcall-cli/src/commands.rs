//! Subcommands and their dispatch onto the engine

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Subcommand};
use rollcall_api::{ClassUpdate, EnrollmentStatus, GeoPoint, NewClass, NewStudent, SessionDraft};
use rollcall_core::{CaptureRequest, RecordQuery};
use rollcall_util::{
    AdminId, ClassId, DateRange, RequestId, SessionId, StudentId, parse_date, parse_time_of_day,
};
use rollcall_verify::ImageStore;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::App;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage training classes
    #[command(subcommand)]
    Class(ClassCommand),

    /// Manage students and their reference faces
    #[command(subcommand)]
    Student(StudentCommand),

    /// Schedule class sessions
    #[command(subcommand)]
    Session(SessionCommand),

    /// Enrollment requests and reviews
    #[command(subcommand)]
    Enroll(EnrollCommand),

    /// Session registrations
    #[command(subcommand)]
    Register(RegisterCommand),

    /// Face-verified check-in and check-out
    #[command(subcommand)]
    Attendance(AttendanceCommand),

    /// Reports over recorded attendance
    #[command(subcommand)]
    Stats(StatsCommand),

    /// Show recent audit events
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Args, Debug)]
pub struct ClassFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long = "type")]
    class_type: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long, requires = "longitude", allow_negative_numbers = true)]
    latitude: Option<f64>,
    #[arg(long, requires = "latitude", allow_negative_numbers = true)]
    longitude: Option<f64>,
    #[arg(long)]
    academic_year: Option<String>,
}

impl ClassFields {
    fn point(&self) -> Option<GeoPoint> {
        GeoPoint::from_parts(self.latitude, self.longitude)
    }
}

#[derive(Subcommand, Debug)]
pub enum ClassCommand {
    Create {
        #[arg(long)]
        code: String,
        #[command(flatten)]
        fields: ClassFields,
    },
    Update {
        id: ClassId,
        #[command(flatten)]
        fields: ClassFields,
    },
    /// Delete a class without sessions or enrollment requests
    Delete { id: ClassId },
    Show { id: ClassId },
    List,
}

#[derive(Subcommand, Debug)]
pub enum StudentCommand {
    Add {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Store a reference photo and use it for face verification
    SetFace {
        id: StudentId,
        #[arg(long)]
        image: PathBuf,
    },
    Show { id: StudentId },
    List,
}

#[derive(Args, Debug)]
pub struct SessionFields {
    #[arg(long = "class")]
    class_id: ClassId,
    #[arg(long, value_parser = parse_date)]
    date: NaiveDate,
    #[arg(long)]
    name: String,
    /// Start time, HH:MM
    #[arg(long, value_parser = parse_time_of_day)]
    start: NaiveTime,
    /// End time, HH:MM
    #[arg(long, value_parser = parse_time_of_day)]
    end: NaiveTime,
}

impl From<SessionFields> for SessionDraft {
    fn from(f: SessionFields) -> Self {
        SessionDraft {
            class_id: f.class_id,
            date: f.date,
            name: f.name,
            start_time: f.start,
            end_time: f.end,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    Create {
        #[command(flatten)]
        fields: SessionFields,
    },
    Update {
        id: SessionId,
        #[command(flatten)]
        fields: SessionFields,
    },
    /// Hide a session; its registrations and attendance are kept
    Delete { id: SessionId },
    Show { id: SessionId },
    /// Sessions on a day (default today), ordered by start time
    List {
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        /// Restrict to these classes; repeatable
        #[arg(long = "class")]
        classes: Vec<ClassId>,
    },
    /// Sessions over a date range
    Range {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long = "class")]
        class_id: Option<ClassId>,
    },
}

#[derive(Subcommand, Debug)]
pub enum EnrollCommand {
    Request {
        #[arg(long = "student")]
        student_id: StudentId,
        #[arg(long = "class")]
        class_id: ClassId,
    },
    Review {
        id: RequestId,
        #[arg(long)]
        admin: String,
        /// approved or rejected
        #[arg(long)]
        decision: EnrollmentStatus,
        /// Required when rejecting, may be empty
        #[arg(long)]
        reason: Option<String>,
    },
    /// Requests, newest first
    List {
        #[arg(long = "class")]
        class_id: Option<ClassId>,
        #[arg(long)]
        status: Option<EnrollmentStatus>,
        #[arg(long = "student", conflicts_with_all = ["class_id", "status"])]
        student_id: Option<StudentId>,
    },
    /// Classes a student is approved for
    Classes {
        #[arg(long = "student")]
        student_id: StudentId,
    },
    /// Pending requests per class
    Pending,
}

#[derive(Subcommand, Debug)]
pub enum RegisterCommand {
    Add {
        #[arg(long = "student")]
        student_id: StudentId,
        #[arg(long = "session")]
        session_id: SessionId,
    },
    List {
        #[arg(long = "student", required_unless_present = "session_id")]
        student_id: Option<StudentId>,
        #[arg(long = "session", conflicts_with = "student_id")]
        session_id: Option<SessionId>,
    },
}

#[derive(Args, Debug)]
pub struct CaptureArgs {
    #[arg(long = "student")]
    student_id: StudentId,
    #[arg(long = "session")]
    session_id: SessionId,
    /// Photo taken for this capture
    #[arg(long)]
    image: PathBuf,
    #[arg(long, allow_negative_numbers = true)]
    latitude: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    longitude: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum AttendanceCommand {
    CheckIn(CaptureArgs),
    CheckOut(CaptureArgs),
    /// Check-ins, newest first
    Records {
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(long = "session")]
        session_id: Option<SessionId>,
        #[arg(long = "class")]
        class_id: Option<ClassId>,
    },
    History {
        #[arg(long = "student")]
        student_id: StudentId,
    },
    Show {
        #[arg(long = "student")]
        student_id: StudentId,
        #[arg(long = "session")]
        session_id: SessionId,
    },
}

#[derive(Args, Debug)]
pub struct RangeArgs {
    #[arg(long, value_parser = parse_date)]
    from: NaiveDate,
    #[arg(long, value_parser = parse_date)]
    to: NaiveDate,
}

impl RangeArgs {
    fn range(&self) -> Result<DateRange> {
        Ok(DateRange::new(self.from, self.to)?)
    }
}

#[derive(Subcommand, Debug)]
pub enum StatsCommand {
    Overview {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long = "class")]
        class_id: Option<ClassId>,
    },
    /// Student × day presence grid for one class
    Matrix {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long = "class")]
        class_id: ClassId,
    },
    /// Far-from-class and no-GPS check-ins
    Far {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long = "class")]
        class_id: Option<ClassId>,
    },
}

/// Run one command and render its result as pretty JSON
pub async fn run(app: &App, command: Command) -> Result<String> {
    let engine = &app.engine;

    match command {
        Command::Class(cmd) => match cmd {
            ClassCommand::Create { code, fields } => render(&engine.catalog().create_class(
                NewClass {
                    code,
                    reference_point: fields.point(),
                    name: fields.name.unwrap_or_default(),
                    class_type: fields.class_type.unwrap_or_default(),
                    location: fields.location.unwrap_or_default(),
                    academic_year: fields.academic_year.unwrap_or_default(),
                },
            )?),
            ClassCommand::Update { id, fields } => render(&engine.catalog().update_class(
                &id,
                ClassUpdate {
                    reference_point: fields.point(),
                    name: fields.name,
                    class_type: fields.class_type,
                    location: fields.location,
                    academic_year: fields.academic_year,
                },
            )?),
            ClassCommand::Delete { id } => {
                engine.catalog().delete_class(&id)?;
                render(&serde_json::json!({ "deleted": id }))
            }
            ClassCommand::Show { id } => render(&engine.catalog().get_class(&id)?),
            ClassCommand::List => render(&engine.catalog().list_classes()?),
        },

        Command::Student(cmd) => match cmd {
            StudentCommand::Add { code, name, email } => {
                render(&engine.catalog().add_student(NewStudent {
                    code,
                    full_name: name,
                    email,
                })?)
            }
            StudentCommand::SetFace { id, image } => {
                engine.catalog().get_student(&id)?;
                let image_ref = store_image(app, &image).await?;
                render(&engine.catalog().set_face_reference(&id, &image_ref)?)
            }
            StudentCommand::Show { id } => render(&engine.catalog().get_student(&id)?),
            StudentCommand::List => render(&engine.catalog().list_students()?),
        },

        Command::Session(cmd) => match cmd {
            SessionCommand::Create { fields } => {
                render(&engine.sessions().create_session(fields.into())?)
            }
            SessionCommand::Update { id, fields } => {
                render(&engine.sessions().update_session(&id, fields.into())?)
            }
            SessionCommand::Delete { id } => {
                engine.sessions().soft_delete_session(&id)?;
                render(&serde_json::json!({ "deleted": id }))
            }
            SessionCommand::Show { id } => render(&engine.sessions().get_session(&id)?),
            SessionCommand::List { date, classes } => match date {
                Some(date) => render(&engine.sessions().list_by_date(date, &classes)?),
                None => render(&engine.sessions().list_today(&classes)?),
            },
            SessionCommand::Range { range, class_id } => render(
                &engine
                    .sessions()
                    .list_in_range(&range.range()?, class_id.as_ref())?,
            ),
        },

        Command::Enroll(cmd) => match cmd {
            EnrollCommand::Request {
                student_id,
                class_id,
            } => render(&engine.enrollment().create_request(&student_id, &class_id)?),
            EnrollCommand::Review {
                id,
                admin,
                decision,
                reason,
            } => render(&engine.enrollment().review(
                &id,
                &AdminId::new(admin),
                decision,
                reason,
            )?),
            EnrollCommand::List {
                class_id,
                status,
                student_id,
            } => match student_id {
                Some(student_id) => render(&engine.enrollment().my_requests(&student_id)?),
                None => render(
                    &engine
                        .enrollment()
                        .all_requests(class_id.as_ref(), status)?,
                ),
            },
            EnrollCommand::Classes { student_id } => {
                render(&engine.enrollment().my_enrolled_classes(&student_id)?)
            }
            EnrollCommand::Pending => {
                let counts: Vec<_> = engine
                    .enrollment()
                    .pending_counts()?
                    .into_iter()
                    .map(|(class_id, pending)| {
                        serde_json::json!({ "class_id": class_id, "pending": pending })
                    })
                    .collect();
                render(&counts)
            }
        },

        Command::Register(cmd) => match cmd {
            RegisterCommand::Add {
                student_id,
                session_id,
            } => render(&engine.registration().register(&student_id, &session_id)?),
            RegisterCommand::List {
                student_id,
                session_id,
            } => match (student_id, session_id) {
                (_, Some(session_id)) => {
                    render(&engine.registration().registrations_for_session(&session_id)?)
                }
                (Some(student_id), None) => {
                    render(&engine.registration().registrations_for_student(&student_id)?)
                }
                (None, None) => anyhow::bail!("either --student or --session is required"),
            },
        },

        Command::Attendance(cmd) => match cmd {
            AttendanceCommand::CheckIn(capture) => {
                let request = capture_request(app, capture).await?;
                render(&engine.attendance().check_in(request).await?)
            }
            AttendanceCommand::CheckOut(capture) => {
                let request = capture_request(app, capture).await?;
                render(&engine.attendance().check_out(request).await?)
            }
            AttendanceCommand::Records {
                date,
                session_id,
                class_id,
            } => render(&engine.attendance().get_records(&RecordQuery {
                date,
                session_id,
                class_id,
            })?),
            AttendanceCommand::History { student_id } => {
                render(&engine.attendance().get_my_history(&student_id)?)
            }
            AttendanceCommand::Show {
                student_id,
                session_id,
            } => render(&engine.attendance().get_attendance(&student_id, &session_id)?),
        },

        Command::Stats(cmd) => match cmd {
            StatsCommand::Overview { range, class_id } => render(
                &engine
                    .statistics()
                    .overview(&range.range()?, class_id.as_ref())?,
            ),
            StatsCommand::Matrix { range, class_id } => render(
                &engine
                    .statistics()
                    .attendance_matrix(&range.range()?, &class_id)?,
            ),
            StatsCommand::Far { range, class_id } => render(
                &engine
                    .statistics()
                    .far_check_in_details(&range.range()?, class_id.as_ref())?,
            ),
        },

        Command::Audit { limit } => render(&engine.recent_audits(limit)?),
    }
}

fn render<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize output")
}

/// Copy a photo into the image store and return its durable reference
async fn store_image(app: &App, path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {:?}", path))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    let image_ref = app
        .images
        .store(&bytes, extension)
        .await
        .map_err(rollcall_util::RollcallError::from)?;
    debug!(source = %path.display(), image_ref = %image_ref, "Image stored");
    Ok(image_ref)
}

async fn capture_request(app: &App, capture: CaptureArgs) -> Result<CaptureRequest> {
    let image_ref = store_image(app, &capture.image).await?;
    Ok(CaptureRequest {
        student_id: capture.student_id,
        session_id: capture.session_id,
        image_ref,
        latitude: capture.latitude,
        longitude: capture.longitude,
    })
}
