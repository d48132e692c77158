//! Class catalog and student directory

use rollcall_api::{ClassUpdate, GeoPoint, NewClass, NewStudent, Student, TrainingClass};
use rollcall_store::{AuditEventType, StoreError};
use rollcall_util::{ClassId, Result, RollcallError, StudentId};
use std::sync::Arc;
use tracing::info;

use crate::context::Context;

/// Shared class and student records the lifecycle reads by reference
pub struct Catalog {
    ctx: Arc<Context>,
}

impl Catalog {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub fn create_class(&self, new: NewClass) -> Result<TrainingClass> {
        let code = new.code.trim().to_string();
        if code.is_empty() {
            return Err(RollcallError::validation("class code cannot be empty"));
        }
        require_text("class name", &new.name)?;
        check_point(new.reference_point)?;

        if self.ctx.store.get_class_by_code(&code)?.is_some() {
            return Err(RollcallError::conflict(format!("class code '{}' already exists", code)));
        }

        let class = TrainingClass {
            id: ClassId::new(),
            code,
            name: new.name.trim().to_string(),
            class_type: new.class_type,
            location: new.location,
            reference_point: new.reference_point,
            academic_year: new.academic_year,
            created_at: self.ctx.clock.now(),
        };

        self.ctx.store.insert_class(&class).map_err(|e| match e {
            StoreError::Conflict(_) => {
                RollcallError::conflict(format!("class code '{}' already exists", class.code))
            }
            other => other.into(),
        })?;

        info!(class_id = %class.id, code = %class.code, "Class created");
        self.ctx.audit(AuditEventType::ClassCreated {
            class_id: class.id,
            code: class.code.clone(),
        });

        Ok(class)
    }

    /// Change descriptive fields; the code never changes
    pub fn update_class(&self, id: &ClassId, update: ClassUpdate) -> Result<TrainingClass> {
        let mut class = self.ctx.class(id)?;

        if let Some(name) = update.name {
            require_text("class name", &name)?;
            class.name = name.trim().to_string();
        }
        if let Some(class_type) = update.class_type {
            class.class_type = class_type;
        }
        if let Some(location) = update.location {
            class.location = location;
        }
        if let Some(point) = update.reference_point {
            check_point(Some(point))?;
            class.reference_point = Some(point);
        }
        if let Some(academic_year) = update.academic_year {
            class.academic_year = academic_year;
        }

        if !self.ctx.store.update_class(&class)? {
            return Err(RollcallError::not_found(format!("class {}", id)));
        }

        info!(class_id = %class.id, "Class updated");
        self.ctx.audit(AuditEventType::ClassUpdated { class_id: class.id });

        Ok(class)
    }

    /// Delete a class nothing refers to
    pub fn delete_class(&self, id: &ClassId) -> Result<()> {
        let class = self.ctx.class(id)?;

        let in_use = || {
            RollcallError::conflict(format!(
                "class '{}' still has sessions or enrollment requests",
                class.code
            ))
        };

        if self.ctx.store.count_class_dependents(id)? > 0 {
            return Err(in_use());
        }

        match self.ctx.store.delete_class(id) {
            Ok(true) => {}
            Ok(false) => return Err(RollcallError::not_found(format!("class {}", id))),
            Err(StoreError::Conflict(_)) => return Err(in_use()),
            Err(e) => return Err(e.into()),
        }

        info!(class_id = %id, code = %class.code, "Class deleted");
        self.ctx.audit(AuditEventType::ClassDeleted {
            class_id: *id,
            code: class.code,
        });

        Ok(())
    }

    pub fn get_class(&self, id: &ClassId) -> Result<TrainingClass> {
        self.ctx.class(id)
    }

    /// All classes ordered by code
    pub fn list_classes(&self) -> Result<Vec<TrainingClass>> {
        Ok(self.ctx.store.list_classes()?)
    }

    /// Create configured classes whose code is not yet known
    pub fn seed_classes(&self, classes: &[NewClass]) -> Result<usize> {
        let mut created = 0;
        for new in classes {
            if self.ctx.store.get_class_by_code(new.code.trim())?.is_none() {
                self.create_class(new.clone())?;
                created += 1;
            }
        }

        if created > 0 {
            info!(created, "Seeded classes from configuration");
        }
        self.ctx.audit(AuditEventType::ConfigLoaded {
            seeded_classes: created,
        });

        Ok(created)
    }

    pub fn add_student(&self, new: NewStudent) -> Result<Student> {
        let code = new.code.trim().to_string();
        if code.is_empty() {
            return Err(RollcallError::validation("student code cannot be empty"));
        }
        require_text("student name", &new.full_name)?;

        let student = Student {
            id: StudentId::new(),
            code,
            full_name: new.full_name.trim().to_string(),
            email: new.email.filter(|e| !e.trim().is_empty()),
            face_ref: None,
            created_at: self.ctx.clock.now(),
        };

        self.ctx.store.insert_student(&student).map_err(|e| match e {
            StoreError::Conflict(_) => RollcallError::conflict(format!(
                "student code '{}' already exists",
                student.code
            )),
            other => other.into(),
        })?;

        info!(student_id = %student.id, code = %student.code, "Student added");
        self.ctx.audit(AuditEventType::StudentAdded {
            student_id: student.id,
            code: student.code.clone(),
        });

        Ok(student)
    }

    /// Set the reference image check-ins are compared against
    pub fn set_face_reference(&self, id: &StudentId, image_ref: &str) -> Result<Student> {
        require_text("face reference", image_ref)?;
        if !self.ctx.store.set_face_ref(id, image_ref.trim())? {
            return Err(RollcallError::not_found(format!("student {}", id)));
        }

        info!(student_id = %id, "Face reference set");
        self.ctx.audit(AuditEventType::FaceReferenceSet { student_id: *id });

        self.ctx.student(id)
    }

    pub fn get_student(&self, id: &StudentId) -> Result<Student> {
        self.ctx.student(id)
    }

    /// All students ordered by code
    pub fn list_students(&self) -> Result<Vec<Student>> {
        Ok(self.ctx.store.list_students()?)
    }
}

fn require_text(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RollcallError::validation(format!("{} cannot be empty", what)));
    }
    Ok(())
}

fn check_point(point: Option<GeoPoint>) -> Result<()> {
    match point {
        Some(p) if !p.is_valid() => Err(RollcallError::validation(format!(
            "coordinates ({}, {}) out of range",
            p.latitude, p.longitude
        ))),
        _ => Ok(()),
    }
}
