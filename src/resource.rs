//! Static catalogue of the resources each role manages: endpoints, form
//! fields, table columns and what the server allows on them.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    SuperAdmin,
    Admin,
    LibraryStaff,
}

impl Role {
    pub fn title(self) -> &'static str {
        match self {
            Role::SuperAdmin => "Super Admin",
            Role::Admin => "Admin Panel",
            Role::LibraryStaff => "Library Staff",
        }
    }

    pub fn resources(self) -> &'static [ResourceKind] {
        match self {
            Role::SuperAdmin => &[ResourceKind::University, ResourceKind::Admin],
            Role::Admin => &[ResourceKind::College, ResourceKind::LibraryStaff],
            Role::LibraryStaff => &[
                ResourceKind::Student,
                ResourceKind::StudentInfo,
                ResourceKind::Department,
                ResourceKind::Project,
                ResourceKind::Supervisor,
                ResourceKind::SupervisorInfo,
                ResourceKind::Approval,
            ],
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "super-admin" | "superadmin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "library-staff" | "library" => Ok(Role::LibraryStaff),
            other => Err(format!(
                "unknown role '{}' (expected super-admin, admin or library-staff)",
                other
            )),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::SuperAdmin => "super-admin",
            Role::Admin => "admin",
            Role::LibraryStaff => "library-staff",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    University,
    Admin,
    College,
    LibraryStaff,
    Department,
    Project,
    Supervisor,
    Student,
    SupervisorInfo,
    StudentInfo,
    Approval,
}

impl ResourceKind {
    pub fn spec(self) -> &'static ResourceSpec {
        match self {
            ResourceKind::University => &UNIVERSITIES,
            ResourceKind::Admin => &ADMINS,
            ResourceKind::College => &COLLEGES,
            ResourceKind::LibraryStaff => &LIBRARY_STAFF,
            ResourceKind::Department => &DEPARTMENTS,
            ResourceKind::Project => &PROJECTS,
            ResourceKind::Supervisor => &SUPERVISORS,
            ResourceKind::Student => &STUDENTS,
            ResourceKind::SupervisorInfo => &SUPERVISOR_INFO,
            ResourceKind::StudentInfo => &STUDENT_INFO,
            ResourceKind::Approval => &APPROVALS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Masked in the form, never pre-filled on edit.
    Secret,
    /// Local file path, sent as a multipart file part.
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Optional,
    Always,
    OnCreate,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: Requirement,
    /// Fixed after creation: shown read-only in the edit form and never sent on update.
    pub immutable: bool,
    /// Only part of the add form.
    pub create_only: bool,
    /// Value is also sent under this name (e.g. a password confirmation).
    pub mirror: Option<&'static str>,
}

impl FieldSpec {
    const fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: Requirement::Optional,
            immutable: false,
            create_only: false,
            mirror: None,
        }
    }

    pub const fn text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Text)
    }

    pub const fn secret(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Secret)
    }

    pub const fn file(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::File)
    }

    pub const fn required(mut self) -> Self {
        self.required = Requirement::Always;
        self
    }

    pub const fn required_on_create(mut self) -> Self {
        self.required = Requirement::OnCreate;
        self
    }

    pub const fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub const fn create_only(mut self) -> Self {
        self.create_only = true;
        self
    }

    pub const fn mirrored_as(mut self, name: &'static str) -> Self {
        self.mirror = Some(name);
        self
    }

    pub fn is_required(&self, editing: bool) -> bool {
        match self.required {
            Requirement::Optional => false,
            Requirement::Always => true,
            Requirement::OnCreate => !editing,
        }
    }
}

/// A table column; `path` may be dotted to reach into nested objects.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub path: &'static str,
    pub title: &'static str,
}

const fn col(path: &'static str, title: &'static str) -> ColumnSpec {
    ColumnSpec { path, title }
}

/// A column the rows can be narrowed by; `key` cycles through its values.
#[derive(Debug)]
pub struct FilterSpec {
    pub key: char,
    pub path: &'static str,
    pub title: &'static str,
    /// Dates collapse to their year (`2024-06-30` -> `2024`).
    pub year_only: bool,
}

/// A confirmed, state-changing operation other than delete.
#[derive(Debug, PartialEq, Eq)]
pub struct ActionSpec {
    pub key: char,
    pub label: &'static str,
    pub past: &'static str,
    pub path: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTransport {
    /// POST a multipart body carrying `_method=PUT`.
    MethodOverride,
    /// Native PUT with a JSON body.
    JsonPut,
}

#[derive(Debug)]
pub struct Capabilities {
    pub create: bool,
    pub update: bool,
    pub delete: bool,
    pub import_path: Option<&'static str>,
    pub actions: &'static [ActionSpec],
}

const CRUD: Capabilities = Capabilities {
    create: true,
    update: true,
    delete: true,
    import_path: None,
    actions: &[],
};

const READ_ONLY: Capabilities = Capabilities {
    create: false,
    update: false,
    delete: false,
    import_path: None,
    actions: &[],
};

#[derive(Debug)]
pub struct ResourceSpec {
    pub title: &'static str,
    pub singular: &'static str,
    pub list_path: &'static str,
    /// May hold `{field}` placeholders filled from the draft.
    pub create_path: &'static str,
    /// Holds `{id}`.
    pub item_path: &'static str,
    pub update_transport: UpdateTransport,
    pub fields: &'static [FieldSpec],
    pub columns: &'static [ColumnSpec],
    pub filters: &'static [FilterSpec],
    pub capabilities: Capabilities,
    pub copy_column: Option<&'static str>,
}

impl ResourceSpec {
    pub fn filter(&self, key: char) -> Option<usize> {
        self.filters.iter().position(|f| f.key == key)
    }

    pub fn action(&self, key: char) -> Option<&'static ActionSpec> {
        self.capabilities.actions.iter().find(|a| a.key == key)
    }
}

pub static UNIVERSITIES: ResourceSpec = ResourceSpec {
    title: "Universities",
    singular: "University",
    list_path: "/superadmin/universities",
    create_path: "/superadmin/university",
    item_path: "/superadmin/university/{id}",
    update_transport: UpdateTransport::MethodOverride,
    fields: &[
        FieldSpec::text("name", "Name").required(),
        FieldSpec::text("address", "Address").required(),
        FieldSpec::file("image", "Image"),
    ],
    columns: &[
        col("name", "Name"),
        col("address", "Address"),
        col("image", "Image"),
    ],
    filters: &[],
    capabilities: CRUD,
    copy_column: None,
};

pub static ADMINS: ResourceSpec = ResourceSpec {
    title: "Admins",
    singular: "Admin",
    list_path: "/superadmin/admins",
    create_path: "/superadmin/admin/{university_id}",
    item_path: "/superadmin/admin/{id}",
    update_transport: UpdateTransport::JsonPut,
    fields: &[
        FieldSpec::text("name", "Name").required(),
        FieldSpec::text("email", "Email").required().immutable(),
        FieldSpec::secret("password", "Password")
            .required_on_create()
            .mirrored_as("password_confirmation"),
        FieldSpec::text("university_id", "University ID")
            .required()
            .create_only(),
    ],
    columns: &[
        col("name", "Name"),
        col("email", "Email"),
        col("university.name", "University"),
    ],
    filters: &[],
    capabilities: CRUD,
    copy_column: Some("email"),
};

pub static COLLEGES: ResourceSpec = ResourceSpec {
    title: "Colleges",
    singular: "College",
    list_path: "/admin/colleges",
    create_path: "/admin/colleges",
    item_path: "/admin/colleges/{id}",
    update_transport: UpdateTransport::MethodOverride,
    fields: &[
        FieldSpec::text("name", "College Name").required(),
        FieldSpec::text("university_id", "University ID").required(),
    ],
    columns: &[col("name", "College Name"), col("university_id", "University")],
    filters: &[],
    capabilities: CRUD,
    copy_column: None,
};

pub static LIBRARY_STAFF: ResourceSpec = ResourceSpec {
    title: "Library Staff",
    singular: "Library staff member",
    list_path: "/admin/library-staff",
    create_path: "/admin/library-staff",
    item_path: "/admin/library-staff/{id}",
    update_transport: UpdateTransport::MethodOverride,
    fields: &[
        FieldSpec::text("name", "Name").required(),
        FieldSpec::text("email", "Email").required().immutable(),
        FieldSpec::secret("password", "Password").required_on_create(),
    ],
    columns: &[
        col("name", "Name"),
        col("email", "Email"),
        col("college.name", "College"),
    ],
    filters: &[],
    capabilities: CRUD,
    copy_column: Some("email"),
};

// `librarayStaff` is the server's route segment.
pub static DEPARTMENTS: ResourceSpec = ResourceSpec {
    title: "Departments",
    singular: "Department",
    list_path: "/librarayStaff/departments",
    create_path: "/librarayStaff/departments",
    item_path: "/librarayStaff/departments/{id}",
    update_transport: UpdateTransport::MethodOverride,
    fields: &[FieldSpec::text("name", "Department Name").required()],
    columns: &[col("name", "Department Name")],
    filters: &[],
    capabilities: CRUD,
    copy_column: None,
};

pub static PROJECTS: ResourceSpec = ResourceSpec {
    title: "Projects",
    singular: "Project",
    list_path: "/librarayStaff/projects",
    create_path: "/librarayStaff/projects",
    item_path: "/librarayStaff/projects/{id}",
    update_transport: UpdateTransport::MethodOverride,
    fields: &[
        FieldSpec::text("title", "Title").required(),
        FieldSpec::text("department_id", "Department ID").required(),
        FieldSpec::text("supervisor_id", "Supervisor ID").required(),
        FieldSpec::text("projectYear", "Year").required(),
    ],
    columns: &[
        col("title", "Title"),
        col("department.name", "Department"),
        col("supervisor.user.name", "Supervisor"),
        col("projectYear", "Year"),
    ],
    filters: &[],
    capabilities: CRUD,
    copy_column: None,
};

pub static SUPERVISORS: ResourceSpec = ResourceSpec {
    title: "Supervisors",
    singular: "Supervisor",
    list_path: "/librarayStaff/supervisors",
    create_path: "/librarayStaff/supervisors",
    item_path: "/librarayStaff/supervisors/{id}",
    update_transport: UpdateTransport::MethodOverride,
    fields: &[
        FieldSpec::text("name", "Name").required(),
        FieldSpec::text("email", "Email").required().immutable(),
        FieldSpec::secret("password", "Password").required_on_create(),
        FieldSpec::text("groupNumber", "Group Number").required(),
        FieldSpec::text("department", "Department").required(),
        FieldSpec::text("qualification", "Qualification").required(),
    ],
    columns: &[
        col("name", "Name"),
        col("email", "Email"),
        col("groupNumber", "Group"),
        col("department", "Department"),
        col("qualification", "Qualification"),
    ],
    filters: &[],
    capabilities: CRUD,
    copy_column: Some("email"),
};

pub static STUDENTS: ResourceSpec = ResourceSpec {
    title: "Students",
    singular: "Student",
    list_path: "/librarayStaff/students",
    create_path: "/librarayStaff/students",
    item_path: "/librarayStaff/students/{id}",
    update_transport: UpdateTransport::MethodOverride,
    fields: &[
        FieldSpec::text("name", "Name").required(),
        FieldSpec::text("student_number", "Student Number").required(),
        FieldSpec::text("email", "Email").required().immutable(),
        FieldSpec::text("group_number", "Group Number").required(),
    ],
    columns: &[
        col("name", "Name"),
        col("student_number", "Student No."),
        col("email", "Email"),
        col("group_number", "Group"),
    ],
    filters: &[],
    capabilities: Capabilities {
        import_path: Some("/librarayStaff/students/import"),
        ..CRUD
    },
    copy_column: Some("email"),
};

pub static SUPERVISOR_INFO: ResourceSpec = ResourceSpec {
    title: "Supervisor Emails",
    singular: "Supervisor",
    list_path: "/librarayStaff/supervisors/information",
    create_path: "",
    item_path: "",
    update_transport: UpdateTransport::MethodOverride,
    fields: &[],
    columns: &[
        col("user.name", "Name"),
        col("user.email", "Email"),
        col("supervisorDgree", "Degree"),
    ],
    filters: &[],
    capabilities: READ_ONLY,
    copy_column: Some("user.email"),
};

pub static STUDENT_INFO: ResourceSpec = ResourceSpec {
    title: "Student Emails",
    singular: "Student",
    list_path: "/librarayStaff/students/information",
    create_path: "",
    item_path: "",
    update_transport: UpdateTransport::MethodOverride,
    fields: &[],
    columns: &[
        col("name", "Name"),
        col("email", "Email"),
        col("department", "Department"),
        col("graduation_year", "Graduation"),
    ],
    filters: &[
        FilterSpec {
            key: 'f',
            path: "department",
            title: "Department",
            year_only: false,
        },
        FilterSpec {
            key: 'y',
            path: "graduation_year",
            title: "Year",
            year_only: true,
        },
    ],
    capabilities: READ_ONLY,
    copy_column: Some("email"),
};

pub static APPROVALS: ResourceSpec = ResourceSpec {
    title: "Approvals",
    singular: "Approval",
    list_path: "/librarayStaff/approvals",
    create_path: "",
    item_path: "",
    update_transport: UpdateTransport::MethodOverride,
    fields: &[],
    columns: &[
        col("file", "File"),
        col("groupNumber", "Group Number"),
        col("projectName", "Project Name"),
    ],
    filters: &[],
    capabilities: Capabilities {
        actions: &[
            ActionSpec {
                key: 'p',
                label: "Approve",
                past: "approved",
                path: "/librarayStaff/approvals/{id}/approve",
            },
            ActionSpec {
                key: 'x',
                label: "Reject",
                past: "rejected",
                path: "/librarayStaff/approvals/{id}/reject",
            },
        ],
        ..READ_ONLY
    },
    copy_column: None,
};
