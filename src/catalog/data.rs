//! Catalog entries

use super::{Country, FieldSpec, FieldType, ServiceDefinition};

const fn field(
    name: &'static str,
    label: &'static str,
    field_type: FieldType,
    required: bool,
) -> FieldSpec {
    FieldSpec {
        name,
        label,
        field_type,
        required,
    }
}

use FieldType::{Date, Number, Text, Textarea};

pub static SERVICES: &[ServiceDefinition] = &[
    // Tunisie
    ServiceDefinition {
        value: "PERMIS_CONSTRUIRE",
        label: "Permis de construire",
        short_label: "Permis construire",
        country: Country::Tunisia,
        description: "Autorisation nécessaire pour entreprendre des travaux de construction, d'extension ou de rénovation.",
        fields: &[
            field("adresse", "Adresse du terrain", Text, true),
            field("numeroFoncier", "Numéro du lot/terrain", Text, true),
            field("typeConstruction", "Type de construction", Text, true),
        ],
        documents: &[
            "Copie CIN",
            "Plan architectural",
            "Titre de propriété",
            "Attestation de conformité",
        ],
    },
    ServiceDefinition {
        value: "RENOUVELLEMENT_LICENCE_COMMERCIALE",
        label: "Renouvellement de licence commerciale",
        short_label: "Renouv. licence",
        country: Country::Tunisia,
        description: "Demande visant à prolonger la validité de votre licence pour un commerce existant.",
        fields: &[
            field("raisonSociale", "Nom commercial", Text, true),
            field("adresseCommerce", "Adresse du commerce", Text, true),
            field("ancienneLicence", "Numéro de l’ancienne licence", Text, true),
        ],
        documents: &["Ancienne licence", "CIN", "Reçu de paiement"],
    },
    ServiceDefinition {
        value: "ENTRETIEN_VOIRIE",
        label: "Demande d’entretien de voirie",
        short_label: "Entretien voirie",
        country: Country::Tunisia,
        description: "Signalement et demande d’intervention pour la maintenance des routes et trottoirs.",
        fields: &[
            field("nomVoie", "Nom de la voie", Text, true),
            field("descriptionProbleme", "Description du problème", Textarea, true),
            field("detailsLocalisation", "Détails de localisation", Text, false),
        ],
        documents: &["Photos (optionnel)"],
    },
    ServiceDefinition {
        value: "OCCUPATION_DOMAINE_PUBLIC",
        label: "Autorisation d’occupation du domaine public",
        short_label: "Occupation domaine",
        country: Country::Tunisia,
        description: "Autorisation temporaire d’occuper un espace public (étal, chantier, évènement, etc.).",
        fields: &[
            field("lieu", "Lieu d’occupation", Text, true),
            field("objet", "Objet", Textarea, true),
            field("duree", "Durée (jours)", Number, true),
        ],
        documents: &[],
    },
    ServiceDefinition {
        value: "COLLECTE_DECHETS",
        label: "Demande de collecte des déchets",
        short_label: "Collecte déchets",
        country: Country::Tunisia,
        description: "Organisation d’une collecte ponctuelle de déchets volumineux ou spécifiques.",
        fields: &[
            field("adresseSite", "Adresse du site", Text, true),
            field("details", "Détails", Textarea, true),
        ],
        documents: &[],
    },
    ServiceDefinition {
        value: "CERTIFICAT_CONFORMITE",
        label: "Certificat de conformité",
        short_label: "Certificat conformité",
        country: Country::Tunisia,
        description: "Attestation confirmant la conformité d’un bâtiment ou d’une installation aux normes en vigueur.",
        fields: &[
            field("adresseBatiment", "Adresse du bâtiment", Text, true),
            field("numeroPermis", "Numéro du permis", Text, true),
        ],
        documents: &[],
    },
    ServiceDefinition {
        value: "CERTIFICAT_PROPRIETE",
        label: "Certificat de propriété",
        short_label: "Certificat propriété",
        country: Country::Tunisia,
        description: "Document attestant la propriété d’un bien immobilier pour les démarches administratives.",
        fields: &[
            field("adresseBien", "Adresse du bien", Text, true),
            field("nomProprietaire", "Nom du propriétaire", Text, true),
        ],
        documents: &[],
    },
    ServiceDefinition {
        value: "CERTIFICAT_NON_OPPOSITION",
        label: "Certificat de non-opposition",
        short_label: "Non-opposition",
        country: Country::Tunisia,
        description: "Atteste qu’aucune opposition n’a été formulée à l’encontre d’un projet déclaré.",
        fields: &[
            field("adresseProjet", "Adresse du projet", Text, true),
            field("descriptionProjet", "Description du projet", Textarea, true),
        ],
        documents: &[],
    },
    ServiceDefinition {
        value: "AUTORISATION_FOUILLES",
        label: "Autorisation de fouilles",
        short_label: "Autorisation fouilles",
        country: Country::Tunisia,
        description: "Permet d’effectuer des fouilles (réseaux, archéologie, etc.) sur le domaine public.",
        fields: &[
            field("lieuFouille", "Lieu de fouille", Text, true),
            field("butFouille", "But des fouilles", Textarea, true),
            field("dureeEstimee", "Durée estimée (jours)", Number, true),
        ],
        documents: &[],
    },
    // Sénégal
    ServiceDefinition {
        value: "PERMIS_CONSTRUIRE_SN",
        label: "Permis de construire",
        short_label: "Permis construire",
        country: Country::Senegal,
        description: "Autorisation requise pour démarrer des travaux de construction sur le territoire communal.",
        fields: &[
            field("adresse", "Adresse du terrain", Text, true),
            field("numeroParcelle", "Numéro de parcelle", Text, true),
            field("usage", "Usage (habitation, commerce, etc.)", Text, true),
        ],
        documents: &[],
    },
    ServiceDefinition {
        value: "LICENCE_ETAL",
        label: "Licence d’étal / occupation du domaine public",
        short_label: "Licence étal",
        country: Country::Senegal,
        description: "Demande d’autorisation pour l’installation d’un étal ou l’occupation temporaire du domaine public.",
        fields: &[
            field("emplacement", "Emplacement", Text, true),
            field("activite", "Activité", Text, true),
            field("duree", "Durée (jours)", Number, true),
        ],
        documents: &[],
    },
    ServiceDefinition {
        value: "DECLARATION_TRAVAUX",
        label: "Déclaration de travaux",
        short_label: "Déclaration travaux",
        country: Country::Senegal,
        description: "Notification préalable à des travaux légers ne nécessitant pas de permis complet.",
        fields: &[
            field("adresseChantier", "Adresse du chantier", Text, true),
            field("natureTravaux", "Nature des travaux", Textarea, true),
            field("dateDebut", "Date de début", Date, true),
        ],
        documents: &[],
    },
    ServiceDefinition {
        value: "CERTIFICAT_RESIDENCE",
        label: "Certificat de résidence",
        short_label: "Certificat résidence",
        country: Country::Senegal,
        description: "Attestation confirmant la résidence d’une personne à une adresse donnée.",
        fields: &[
            field("nom", "Nom", Text, true),
            field("adresse", "Adresse", Text, true),
            field("numeroCNI", "Numéro CNI", Text, true),
        ],
        documents: &[],
    },
    ServiceDefinition {
        value: "EXTRAIT_NAISSANCE",
        label: "Extrait de naissance (copie)",
        short_label: "Extrait naissance",
        country: Country::Senegal,
        description: "Copie officielle de l’acte de naissance pour démarches administratives.",
        fields: &[
            field("nom", "Nom", Text, true),
            field("prenom", "Prénom", Text, true),
            field("dateNaissance", "Date de naissance", Date, true),
            field("lieuNaissance", "Lieu de naissance", Text, true),
        ],
        documents: &[],
    },
    ServiceDefinition {
        value: "CERTIFICAT_MARIAGE",
        label: "Certificat de mariage (copie)",
        short_label: "Certificat mariage",
        country: Country::Senegal,
        description: "Copie certifiée de l’acte de mariage pour dossiers officiels.",
        fields: &[
            field("nomEpoux", "Nom de l’époux", Text, true),
            field("nomEpouse", "Nom de l’épouse", Text, true),
            field("dateMariage", "Date du mariage", Date, true),
        ],
        documents: &[],
    },
];
